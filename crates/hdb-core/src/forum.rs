//! Forum topic mirror of ticket state.
//!
//! The store is authoritative. Each step here is attempted independently and a
//! failing step is logged without touching the others or the committed state.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    domain::{ChatId, MessageRef, Recipient, TicketId, TopicRef},
    messaging::{port::MessagingPort, types::OutboundMedia},
    ticket::{lifecycle::SideEffects, TicketStatus},
};

pub fn topic_title(ticket_id: TicketId, status: TicketStatus) -> String {
    format!("{} Ticket #{ticket_id}", status.glyph())
}

pub fn status_announcement(ticket_id: TicketId, status: TicketStatus) -> String {
    format!(
        "🔔 Ticket #{ticket_id} status changed to: <b>{}</b>",
        status.label()
    )
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StepResult {
    #[default]
    Skipped,
    Done,
    Failed,
}

impl StepResult {
    fn from_attempt<T, E>(r: &std::result::Result<T, E>) -> Self {
        if r.is_ok() {
            Self::Done
        } else {
            Self::Failed
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub renamed: StepResult,
    pub closed: StepResult,
    pub announced: StepResult,
}

pub struct ForumSync {
    messenger: Arc<dyn MessagingPort>,
}

impl ForumSync {
    pub fn new(messenger: Arc<dyn MessagingPort>) -> Self {
        Self { messenger }
    }

    /// Create the topic for a new ticket. `None` when the transport refused.
    pub async fn open_topic(&self, chat_id: ChatId, ticket_id: TicketId) -> Option<TopicRef> {
        let title = topic_title(ticket_id, TicketStatus::Open);
        match self.messenger.create_topic(chat_id, &title).await {
            Ok(topic) => {
                info!(ticket_id = ticket_id.0, thread_id = topic.thread_id.0, "forum topic created");
                Some(topic)
            }
            Err(e) => {
                warn!(ticket_id = ticket_id.0, chat_id = chat_id.0, error = %e, "create forum topic failed");
                None
            }
        }
    }

    /// Rename, close when CANCELLED, then announce the new status.
    pub async fn apply_status(
        &self,
        topic: TopicRef,
        ticket_id: TicketId,
        status: TicketStatus,
    ) -> SyncReport {
        let fx = SideEffects {
            rename_topic: true,
            close_topic: status == TicketStatus::Cancelled,
            announce_in_topic: true,
            ..SideEffects::default()
        };
        let text = status_announcement(ticket_id, status);
        self.apply(topic, ticket_id, status, fx, &text).await
    }

    /// Run the topic steps selected by `fx`, announcing with `announcement`.
    pub async fn apply(
        &self,
        topic: TopicRef,
        ticket_id: TicketId,
        status: TicketStatus,
        fx: SideEffects,
        announcement: &str,
    ) -> SyncReport {
        let mut report = SyncReport::default();

        if fx.rename_topic {
            let r = self
                .messenger
                .rename_topic(topic, &topic_title(ticket_id, status))
                .await;
            if let Err(e) = &r {
                warn!(ticket_id = ticket_id.0, thread_id = topic.thread_id.0, error = %e, "rename topic failed");
            }
            report.renamed = StepResult::from_attempt(&r);
        }

        if fx.close_topic && status == TicketStatus::Cancelled {
            let r = self.messenger.close_topic(topic).await;
            if let Err(e) = &r {
                warn!(ticket_id = ticket_id.0, thread_id = topic.thread_id.0, error = %e, "close topic failed");
            }
            report.closed = StepResult::from_attempt(&r);
        }

        if fx.announce_in_topic {
            let r = self.messenger.send_html(topic.into(), announcement).await;
            if let Err(e) = &r {
                warn!(ticket_id = ticket_id.0, thread_id = topic.thread_id.0, error = %e, "status announcement failed");
            }
            report.announced = StepResult::from_attempt(&r);
        }

        report
    }

    /// Best-effort send; failures are logged and reported as `None`.
    pub async fn post(&self, to: Recipient, html: &str) -> Option<MessageRef> {
        match self.messenger.send_html(to, html).await {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(chat_id = to.chat_id.0, error = %e, "post failed");
                None
            }
        }
    }

    /// Re-send attachments into the topic by kind. Returns how many went through.
    pub async fn relay_attachments(
        &self,
        topic: TopicRef,
        ticket_id: TicketId,
        media: &[OutboundMedia],
    ) -> usize {
        let mut delivered = 0;
        for m in media {
            match self.messenger.send_media(topic.into(), m).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    warn!(ticket_id = ticket_id.0, kind = m.kind.as_str(), error = %e, "attachment relay failed")
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::ThreadId,
        testing::{Call, RecordingMessenger},
        ticket::MediaKind,
    };

    fn topic() -> TopicRef {
        TopicRef {
            chat_id: ChatId(-1001),
            thread_id: ThreadId(77),
        }
    }

    #[tokio::test]
    async fn rename_failure_does_not_block_close_or_announce() {
        let m = Arc::new(RecordingMessenger::new());
        m.fail(|f| f.rename = true);
        let sync = ForumSync::new(m.clone());

        let report = sync
            .apply_status(topic(), TicketId(7), TicketStatus::Cancelled)
            .await;
        assert_eq!(
            report,
            SyncReport {
                renamed: StepResult::Failed,
                closed: StepResult::Done,
                announced: StepResult::Done,
            }
        );
        assert_eq!(m.renames(), vec![(topic(), "🟣 Ticket #7".to_string())]);
        assert_eq!(m.closes(), vec![topic()]);
        assert_eq!(
            m.texts_to(topic().into()),
            vec!["🔔 Ticket #7 status changed to: <b>Completed</b>".to_string()]
        );
    }

    #[tokio::test]
    async fn close_failure_still_announces() {
        let m = Arc::new(RecordingMessenger::new());
        m.fail(|f| {
            f.rename = true;
            f.close = true;
        });
        let sync = ForumSync::new(m.clone());
        let report = sync
            .apply_status(topic(), TicketId(7), TicketStatus::Cancelled)
            .await;
        assert_eq!(report.closed, StepResult::Failed);
        assert_eq!(report.announced, StepResult::Done);
    }

    #[tokio::test]
    async fn work_status_never_closes() {
        let m = Arc::new(RecordingMessenger::new());
        let sync = ForumSync::new(m.clone());
        let report = sync
            .apply_status(topic(), TicketId(7), TicketStatus::Work)
            .await;
        assert_eq!(report.closed, StepResult::Skipped);
        assert!(m.closes().is_empty());
        assert_eq!(m.renames()[0].1, "🟡 Ticket #7");
    }

    #[tokio::test]
    async fn announcement_only_effects_skip_topic_cosmetics() {
        let m = Arc::new(RecordingMessenger::new());
        let sync = ForumSync::new(m.clone());
        let fx = SideEffects {
            announce_in_topic: true,
            ..SideEffects::default()
        };
        sync.apply(topic(), TicketId(7), TicketStatus::Work, fx, "again")
            .await;
        assert_eq!(
            m.calls(),
            vec![Call::SendHtml {
                to: topic().into(),
                html: "again".into()
            }]
        );
    }

    #[tokio::test]
    async fn relay_counts_successes() {
        let m = Arc::new(RecordingMessenger::new());
        m.fail(|f| f.send_media = true);
        let sync = ForumSync::new(m.clone());
        let media = vec![OutboundMedia {
            kind: MediaKind::Voice,
            file_id: "v".into(),
            caption: None,
        }];
        assert_eq!(sync.relay_attachments(topic(), TicketId(1), &media).await, 0);
        assert_eq!(m.media_to(topic().into()).len(), 1);
    }
}
