//! Notification fan-out: who hears about a ticket event, and what they read.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    domain::{Recipient, TicketId, UserId},
    formatting::{escape_html, format_local, or_dash, requester_line},
    messaging::port::MessagingPort,
    staff::StaffSnapshot,
    ticket::{RequesterProfile, Ticket, TicketStatus},
};

/// What the owner reads after staff moved their ticket.
pub fn owner_status_text(ticket_id: TicketId, status: TicketStatus) -> String {
    let phrase = match status {
        TicketStatus::Open => "has been reopened",
        TicketStatus::Work => "has been taken into work",
        TicketStatus::Cancelled => "has been completed",
    };
    format!(
        "ℹ️ Your ticket #{ticket_id} {phrase}.\nStatus: <b>{}</b>",
        status.label()
    )
}

pub fn owner_cancel_text(ticket_id: TicketId) -> String {
    format!("🚫 <b>Ticket #{ticket_id} cancelled by the requester.</b>")
}

pub fn relay_header(ticket_id: TicketId) -> String {
    format!("📨 Message about your ticket #{ticket_id}:")
}

/// Structured new-ticket summary for staff DMs.
pub fn new_ticket_summary(
    ticket: &Ticket,
    profile: Option<&RequesterProfile>,
    utc_offset_hours: i32,
) -> String {
    format!(
        "<b>New ticket #{}</b>\n\n\
         <blockquote><b>Requester:</b> {}\n\
         <b>Phone:</b> {}\n\
         <b>Address:</b> {}\n\
         <b>Created:</b> {}\n\
         </blockquote>\n\
         <b>Text:</b>\n<blockquote>{}</blockquote>",
        ticket.id,
        requester_line(profile),
        or_dash(profile.and_then(|p| p.phone.as_deref())),
        or_dash(profile.and_then(|p| p.address.as_deref())),
        format_local(ticket.created_at, utc_offset_hours),
        escape_html(&ticket.text),
    )
}

/// Topic variant of the summary, with the slash-command cheat sheet.
pub fn topic_summary(
    ticket: &Ticket,
    profile: Option<&RequesterProfile>,
    utc_offset_hours: i32,
) -> String {
    let mut out = new_ticket_summary(ticket, profile, utc_offset_hours);
    out.push_str("\n\nSet status:");
    for s in TicketStatus::ALL {
        out.push_str(&format!("\n{}: /{}", s.label(), s.command_word()));
    }
    out
}

/// Staff recipients from the current snapshot, minus `exclude`.
pub fn staff_recipients(snapshot: &StaffSnapshot, exclude: Option<UserId>) -> Vec<UserId> {
    snapshot
        .sorted()
        .into_iter()
        .filter(|id| Some(*id) != exclude)
        .collect()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<UserId>,
    pub failed: Vec<UserId>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

pub struct FanOut {
    messenger: Arc<dyn MessagingPort>,
}

impl FanOut {
    pub fn new(messenger: Arc<dyn MessagingPort>) -> Self {
        Self { messenger }
    }

    pub async fn notify_owner(&self, owner: UserId, html: &str) -> bool {
        match self.messenger.send_html(Recipient::user(owner), html).await {
            Ok(_) => true,
            Err(e) => {
                warn!(user_id = owner.0, error = %e, "owner notification failed");
                false
            }
        }
    }

    /// One independent attempt per recipient, in order.
    pub async fn broadcast(&self, recipients: &[UserId], html: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for &id in recipients {
            match self.messenger.send_html(Recipient::user(id), html).await {
                Ok(_) => report.delivered.push(id),
                Err(e) => {
                    warn!(user_id = id.0, error = %e, "staff notification failed");
                    report.failed.push(id);
                }
            }
        }
        debug!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "fan-out finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::testing::RecordingMessenger;

    #[tokio::test]
    async fn one_failed_recipient_does_not_stop_the_rest() {
        let m = Arc::new(RecordingMessenger::new());
        m.fail(|f| {
            f.send_to.insert(11);
        });
        let fan = FanOut::new(m.clone());
        let report = fan
            .broadcast(&[UserId(10), UserId(11), UserId(12)], "hi")
            .await;
        assert_eq!(report.delivered, vec![UserId(10), UserId(12)]);
        assert_eq!(report.failed, vec![UserId(11)]);
        assert_eq!(m.texts_to(Recipient::user(UserId(12))), vec!["hi".to_string()]);
    }

    #[test]
    fn owner_is_excluded_from_staff_recipients() {
        let snap = StaffSnapshot::new([UserId(3), UserId(1), UserId(2)]);
        assert_eq!(
            staff_recipients(&snap, Some(UserId(2))),
            vec![UserId(1), UserId(3)]
        );
        assert_eq!(staff_recipients(&snap, None).len(), 3);
    }

    #[test]
    fn summary_lists_profile_with_dashes() {
        let ticket = Ticket {
            id: TicketId(4),
            owner: UserId(1),
            text: "Leaking pipe <basement>".into(),
            status: TicketStatus::Open,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            forum: None,
        };
        let profile = RequesterProfile {
            name: "Ivan".into(),
            username: Some("ivan".into()),
            phone: None,
            address: Some("Lenina, h. 5".into()),
        };
        let text = topic_summary(&ticket, Some(&profile), 0);
        assert!(text.starts_with("<b>New ticket #4</b>"));
        assert!(text.contains("<b>Requester:</b> Ivan (@ivan)"));
        assert!(text.contains("<b>Phone:</b> —"));
        assert!(text.contains("<b>Created:</b> 01.05.2024 09:30"));
        assert!(text.contains("Leaking pipe &lt;basement&gt;"));
        assert!(text.ends_with("Completed: /done"));
    }

    #[test]
    fn owner_text_names_the_change() {
        assert_eq!(
            owner_status_text(TicketId(7), TicketStatus::Work),
            "ℹ️ Your ticket #7 has been taken into work.\nStatus: <b>In progress</b>"
        );
    }
}
