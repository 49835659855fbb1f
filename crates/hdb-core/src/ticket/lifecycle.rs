//! Status state machine.
//!
//! Legal edges: OPEN⇄WORK, OPEN→CANCELLED, WORK→CANCELLED. CANCELLED has no
//! outgoing edges. Requesting the current status is accepted and reported as
//! [`TransitionOutcome::AlreadyInStatus`] so callers can skip redundant effects.
//!
//! Stores call [`decide`] inside their read-modify-write so that the check and
//! the write are one step; nothing else writes a ticket status.

use serde::Serialize;

use super::types::{StatusChange, TicketStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// The new status was written.
    Applied,
    /// The ticket already had the requested status; nothing was written.
    AlreadyInStatus,
    /// The edge is not legal; nothing was written.
    Rejected,
}

/// Where a status change request came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    /// Inline button under the panel message in the ticket topic.
    Panel,
    /// `/open`, `/work`, `/done` typed inside the ticket topic.
    TopicCommand,
    /// The owner's self-service cancellation.
    OwnerCancel,
}

impl StatusSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Panel => "panel",
            Self::TopicCommand => "topic_command",
            Self::OwnerCancel => "owner_cancel",
        }
    }

    pub fn requires_staff(self) -> bool {
        !matches!(self, Self::OwnerCancel)
    }
}

pub fn is_legal(from: TicketStatus, to: TicketStatus) -> bool {
    use TicketStatus::*;
    matches!(
        (from, to),
        (Open, Work) | (Work, Open) | (Open, Cancelled) | (Work, Cancelled)
    )
}

pub fn decide(from: TicketStatus, to: TicketStatus) -> TransitionOutcome {
    if from == to {
        TransitionOutcome::AlreadyInStatus
    } else if is_legal(from, to) {
        TransitionOutcome::Applied
    } else {
        TransitionOutcome::Rejected
    }
}

/// Effects a committed (or short-circuited) change should trigger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SideEffects {
    pub rename_topic: bool,
    pub close_topic: bool,
    pub announce_in_topic: bool,
    pub notify_owner: bool,
    pub notify_staff: bool,
}

/// Map a store result to the effects it warrants.
///
/// `display_requested` keeps the in-topic announcement for a repeated status
/// when the actor explicitly asked to see it (panel clicks).
pub fn side_effects(
    change: &StatusChange,
    source: StatusSource,
    display_requested: bool,
) -> SideEffects {
    match change.outcome {
        TransitionOutcome::Applied => SideEffects {
            rename_topic: true,
            close_topic: change.to == TicketStatus::Cancelled,
            announce_in_topic: true,
            // The owner already sees their own cancellation screen.
            notify_owner: source != StatusSource::OwnerCancel,
            notify_staff: source == StatusSource::OwnerCancel,
        },
        TransitionOutcome::AlreadyInStatus => SideEffects {
            announce_in_topic: display_requested,
            ..SideEffects::default()
        },
        TransitionOutcome::Rejected => SideEffects::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TicketId, UserId};
    use TicketStatus::*;

    fn change(from: TicketStatus, to: TicketStatus) -> StatusChange {
        StatusChange {
            ticket_id: TicketId(7),
            from,
            to,
            owner: UserId(1),
            outcome: decide(from, to),
        }
    }

    #[test]
    fn legal_edges_only() {
        let mut legal = Vec::new();
        for from in TicketStatus::ALL {
            for to in TicketStatus::ALL {
                if is_legal(from, to) {
                    legal.push((from, to));
                }
            }
        }
        assert_eq!(
            legal,
            vec![(Open, Work), (Open, Cancelled), (Work, Open), (Work, Cancelled)]
        );
    }

    #[test]
    fn cancelled_is_terminal() {
        assert_eq!(decide(Cancelled, Open), TransitionOutcome::Rejected);
        assert_eq!(decide(Cancelled, Work), TransitionOutcome::Rejected);
        assert_eq!(decide(Cancelled, Cancelled), TransitionOutcome::AlreadyInStatus);
    }

    #[test]
    fn same_status_short_circuits() {
        for s in TicketStatus::ALL {
            assert_eq!(decide(s, s), TransitionOutcome::AlreadyInStatus);
        }
    }

    #[test]
    fn done_closes_topic_work_does_not() {
        let fx = side_effects(&change(Work, Cancelled), StatusSource::Panel, true);
        assert!(fx.rename_topic && fx.close_topic && fx.announce_in_topic && fx.notify_owner);
        assert!(!fx.notify_staff);

        let fx = side_effects(&change(Open, Work), StatusSource::TopicCommand, false);
        assert!(fx.rename_topic && !fx.close_topic && fx.notify_owner);
    }

    #[test]
    fn repeated_status_keeps_only_requested_announcement() {
        let fx = side_effects(&change(Work, Work), StatusSource::Panel, true);
        assert_eq!(
            fx,
            SideEffects {
                announce_in_topic: true,
                ..SideEffects::default()
            }
        );
        let fx = side_effects(&change(Work, Work), StatusSource::TopicCommand, false);
        assert_eq!(fx, SideEffects::default());
    }

    #[test]
    fn owner_cancel_notifies_staff_not_owner() {
        let fx = side_effects(&change(Open, Cancelled), StatusSource::OwnerCancel, false);
        assert!(fx.notify_staff && !fx.notify_owner && fx.close_topic);
    }

    #[test]
    fn rejected_has_no_effects() {
        let fx = side_effects(&change(Cancelled, Open), StatusSource::Panel, true);
        assert_eq!(fx, SideEffects::default());
    }
}
