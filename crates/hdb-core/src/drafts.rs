//! Per-conversation ticket drafts.
//!
//! A draft lives in the arena from "create ticket" until confirm, abort or idle
//! expiry. The phase is an explicit value; handlers move it forward through the
//! methods below and never poke at fields of another phase.

use std::{collections::HashMap, future::Future, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    album::{Ack, AttachmentBatch, FinalizeTicket, RelayStep},
    config::TextLimits,
    domain::{ChatId, MessageId, MessageRef},
    ticket::DraftAttachment,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Conversation {
    AwaitingText,
    CollectingAttachments { text: String, batch: AttachmentBatch },
    Preview { text: String, batch: AttachmentBatch },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("this step is not available right now")]
    WrongPhase,
    #[error("text is too short (minimum {min} characters)")]
    TooShort { min: usize },
    #[error("text is too long (maximum {max} characters)")]
    TooLong { max: usize },
}

impl Conversation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitingText => "awaiting_text",
            Self::CollectingAttachments { .. } => "collecting_attachments",
            Self::Preview { .. } => "preview",
        }
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self, Self::CollectingAttachments { .. })
    }

    /// Accept the ticket body. New text always starts a fresh attachment batch.
    pub fn submit_text(&mut self, text: &str, limits: TextLimits) -> Result<(), DraftError> {
        if !matches!(self, Self::AwaitingText) {
            return Err(DraftError::WrongPhase);
        }
        let text = text.trim();
        let len = text.chars().count();
        if len < limits.min_len {
            return Err(DraftError::TooShort {
                min: limits.min_len,
            });
        }
        if len > limits.max_len {
            return Err(DraftError::TooLong {
                max: limits.max_len,
            });
        }
        *self = Self::CollectingAttachments {
            text: text.to_string(),
            batch: AttachmentBatch::new(),
        };
        Ok(())
    }

    pub fn add_attachment(
        &mut self,
        message_id: MessageId,
        attachment: DraftAttachment,
        group_id: Option<&str>,
    ) -> Result<RelayStep, DraftError> {
        match self {
            Self::CollectingAttachments { batch, .. } => {
                Ok(batch.push(message_id, attachment, group_id))
            }
            _ => Err(DraftError::WrongPhase),
        }
    }

    /// Deferred album finalize; a no-op once the draft has left collection.
    pub fn finalize_album(&mut self, ticket: FinalizeTicket) -> Option<Ack> {
        match self {
            Self::CollectingAttachments { batch, .. } => batch.finalize(ticket),
            _ => None,
        }
    }

    /// Move to preview. An album still open is acknowledged first.
    pub fn finish_attachments(&mut self) -> Result<Option<Ack>, DraftError> {
        let Self::CollectingAttachments { text, batch } = self else {
            return Err(DraftError::WrongPhase);
        };
        let ack = batch.close_open_album();
        let text = std::mem::take(text);
        let batch = std::mem::take(batch);
        *self = Self::Preview { text, batch };
        Ok(ack)
    }

    /// Back from preview to text entry.
    pub fn edit_text(&mut self) -> Result<(), DraftError> {
        if !matches!(self, Self::Preview { .. }) {
            return Err(DraftError::WrongPhase);
        }
        *self = Self::AwaitingText;
        Ok(())
    }

    /// Back from preview to collection, keeping what was already attached.
    pub fn add_more(&mut self) -> Result<usize, DraftError> {
        let Self::Preview { text, batch } = self else {
            return Err(DraftError::WrongPhase);
        };
        let text = std::mem::take(text);
        let mut batch = std::mem::take(batch);
        batch.reset_album();
        let count = batch.len();
        *self = Self::CollectingAttachments { text, batch };
        Ok(count)
    }

    /// Text and attachment count while in preview.
    pub fn preview(&self) -> Option<(&str, usize)> {
        match self {
            Self::Preview { text, batch } => Some((text.as_str(), batch.len())),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DraftSlot {
    pub conversation: Conversation,
    /// The last bot prompt in this chat; replaced as the draft progresses.
    pub service_message: Option<MessageRef>,
    touched_at: DateTime<Utc>,
}

impl DraftSlot {
    /// Remember a new service message and hand back the one it replaces.
    pub fn replace_service_message(&mut self, msg: Option<MessageRef>) -> Option<MessageRef> {
        std::mem::replace(&mut self.service_message, msg)
    }
}

/// A draft that was in preview when the owner confirmed it.
#[derive(Clone, Debug)]
pub struct ConfirmedDraft {
    pub text: String,
    pub attachments: Vec<DraftAttachment>,
    pub service_message: Option<MessageRef>,
}

#[derive(Default)]
pub struct DraftArena {
    slots: Mutex<HashMap<ChatId, DraftSlot>>,
}

impl DraftArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a draft. Returns the previous service message, if any.
    pub async fn start(&self, chat: ChatId) -> Option<MessageRef> {
        let slot = DraftSlot {
            conversation: Conversation::AwaitingText,
            service_message: None,
            touched_at: Utc::now(),
        };
        self.slots
            .lock()
            .await
            .insert(chat, slot)
            .and_then(|old| old.service_message)
    }

    /// Run `f` against the chat's draft. `None` when there is no draft.
    pub async fn with<R>(&self, chat: ChatId, f: impl FnOnce(&mut DraftSlot) -> R) -> Option<R> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(&chat)?;
        slot.touched_at = Utc::now();
        Some(f(slot))
    }

    pub async fn phase(&self, chat: ChatId) -> Option<&'static str> {
        self.slots
            .lock()
            .await
            .get(&chat)
            .map(|s| s.conversation.name())
    }

    /// Remove and return the draft if it is in preview; otherwise leave it be.
    pub async fn take_confirmed(&self, chat: ChatId) -> Option<ConfirmedDraft> {
        let mut slots = self.slots.lock().await;
        if slots.get(&chat)?.conversation.preview().is_none() {
            return None;
        }
        let slot = slots.remove(&chat)?;
        match slot.conversation {
            Conversation::Preview { text, batch } => Some(ConfirmedDraft {
                text,
                attachments: batch.into_attachments(),
                service_message: slot.service_message,
            }),
            _ => None,
        }
    }

    /// Put a confirmed draft back in preview, unless a new draft was started.
    pub async fn restore(&self, chat: ChatId, draft: ConfirmedDraft) {
        let batch = AttachmentBatch::with_attachments(draft.attachments);
        self.slots.lock().await.entry(chat).or_insert_with(|| DraftSlot {
            conversation: Conversation::Preview {
                text: draft.text,
                batch,
            },
            service_message: draft.service_message,
            touched_at: Utc::now(),
        });
    }

    /// Album debounce: wait out `quiet`, take `lock`, run the finalize and
    /// hand its ack to `sink` while the lock is still held.
    ///
    /// `lock` is awaited only after the sleep so the chat is free meanwhile.
    /// A superseded `ticket` yields `None` and `sink` is not called.
    pub async fn finalize_after_quiet<G, F, Fut>(
        &self,
        chat: ChatId,
        ticket: FinalizeTicket,
        quiet: Duration,
        lock: impl Future<Output = G>,
        sink: F,
    ) -> Option<Fut::Output>
    where
        F: FnOnce(Ack) -> Fut,
        Fut: Future,
    {
        tokio::time::sleep(quiet).await;
        let _guard = lock.await;
        let ack = self
            .with(chat, |slot| slot.conversation.finalize_album(ticket))
            .await
            .flatten()?;
        Some(sink(ack).await)
    }

    pub async fn discard(&self, chat: ChatId) -> Option<DraftSlot> {
        self.slots.lock().await.remove(&chat)
    }

    /// Drop drafts untouched for longer than `max_idle`. Returns how many.
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return 0;
        };
        let cutoff = Utc::now() - max_idle;
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|_, s| s.touched_at >= cutoff);
        before - slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::MediaKind;

    fn limits() -> TextLimits {
        TextLimits::default()
    }

    fn doc(n: i32) -> DraftAttachment {
        DraftAttachment {
            kind: MediaKind::Document,
            file_id: format!("doc-{n}"),
            file_unique_id: None,
            caption: Some("scan".into()),
        }
    }

    #[test]
    fn short_text_keeps_phase() {
        let mut c = Conversation::AwaitingText;
        assert_eq!(
            c.submit_text(" hi ", limits()),
            Err(DraftError::TooShort { min: 5 })
        );
        assert_eq!(c, Conversation::AwaitingText);
        assert_eq!(
            c.submit_text(&"x".repeat(501), limits()),
            Err(DraftError::TooLong { max: 500 })
        );
        c.submit_text("Leaking pipe in basement", limits()).unwrap();
        assert!(c.is_collecting());
    }

    #[test]
    fn done_closes_open_album_and_previews() {
        let mut c = Conversation::AwaitingText;
        c.submit_text("Leaking pipe in basement", limits()).unwrap();
        c.add_attachment(MessageId(1), doc(1), Some("g")).unwrap();
        c.add_attachment(MessageId(2), doc(2), Some("g")).unwrap();

        let ack = c.finish_attachments().unwrap();
        assert_eq!(ack, Some(Ack::AlbumComplete { count: 2, total: 2 }));
        assert_eq!(c.preview(), Some(("Leaking pipe in basement", 2)));
        assert_eq!(
            c.add_attachment(MessageId(3), doc(3), None),
            Err(DraftError::WrongPhase)
        );
    }

    #[test]
    fn add_more_keeps_attachments_edit_drops_them() {
        let mut c = Conversation::AwaitingText;
        c.submit_text("Broken intercom", limits()).unwrap();
        c.add_attachment(MessageId(1), doc(1), None).unwrap();
        c.finish_attachments().unwrap();

        assert_eq!(c.add_more(), Ok(1));
        c.finish_attachments().unwrap();
        c.edit_text().unwrap();
        assert_eq!(c, Conversation::AwaitingText);
        c.submit_text("Broken intercom, door 2", limits()).unwrap();
        c.finish_attachments().unwrap();
        assert_eq!(c.preview(), Some(("Broken intercom, door 2", 0)));
    }

    #[test]
    fn stale_finalize_after_leaving_collection_is_ignored() {
        let mut c = Conversation::AwaitingText;
        c.submit_text("Broken intercom", limits()).unwrap();
        let step = c.add_attachment(MessageId(1), doc(1), Some("g")).unwrap();
        c.finish_attachments().unwrap();
        assert_eq!(c.finalize_album(step.schedule.unwrap()), None);
    }

    #[test]
    fn finalize_from_before_an_edit_is_ignored() {
        let mut c = Conversation::AwaitingText;
        c.submit_text("Broken intercom", limits()).unwrap();
        let stale = c.add_attachment(MessageId(1), doc(1), Some("g1")).unwrap();
        c.finish_attachments().unwrap();
        c.edit_text().unwrap();
        c.submit_text("Broken intercom, door 2", limits()).unwrap();
        let fresh = c.add_attachment(MessageId(2), doc(2), Some("g2")).unwrap();
        c.add_attachment(MessageId(3), doc(3), Some("g2")).unwrap();

        assert_eq!(c.finalize_album(stale.schedule.unwrap()), None);
        assert_eq!(c.finalize_album(fresh.schedule.unwrap()), None);
        let last = c.add_attachment(MessageId(4), doc(4), Some("g2")).unwrap();
        assert_eq!(
            c.finalize_album(last.schedule.unwrap()),
            Some(Ack::AlbumComplete { count: 3, total: 3 })
        );
    }

    #[tokio::test]
    async fn finalize_from_before_a_restart_is_ignored() {
        let arena = DraftArena::new();
        let chat = ChatId(7);
        arena.start(chat).await;
        let stale = arena
            .with(chat, |s| {
                s.conversation.submit_text("No hot water", limits())?;
                s.conversation.add_attachment(MessageId(1), doc(1), Some("g1"))
            })
            .await
            .unwrap()
            .unwrap();

        arena.start(chat).await;
        arena
            .with(chat, |s| {
                s.conversation.submit_text("No hot water, flat 12", limits())?;
                s.conversation.add_attachment(MessageId(2), doc(2), Some("g2"))
            })
            .await
            .unwrap()
            .unwrap();

        let ack = arena
            .with(chat, |s| s.conversation.finalize_album(stale.schedule.unwrap()))
            .await
            .unwrap();
        assert_eq!(ack, None);
    }

    #[tokio::test(start_paused = true)]
    async fn album_burst_is_acknowledged_once_after_quiet_period() {
        let arena = std::sync::Arc::new(DraftArena::new());
        let chat = ChatId(3);
        let quiet = Duration::from_millis(800);
        arena.start(chat).await;
        arena
            .with(chat, |s| s.conversation.submit_text("Mould in bathroom", limits()))
            .await
            .unwrap()
            .unwrap();

        let mut timers = Vec::new();
        for n in 1..=5 {
            let step = arena
                .with(chat, |s| s.conversation.add_attachment(MessageId(n), doc(n), Some("g")))
                .await
                .unwrap()
                .unwrap();
            let ticket = step.schedule.unwrap();
            let arena = std::sync::Arc::clone(&arena);
            timers.push(tokio::spawn(async move {
                arena
                    .finalize_after_quiet(chat, ticket, quiet, async {}, |ack| async move { ack })
                    .await
            }));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let mut acks = Vec::new();
        for timer in timers {
            acks.extend(timer.await.unwrap());
        }
        assert_eq!(acks, vec![Ack::AlbumComplete { count: 5, total: 5 }]);
    }

    #[tokio::test]
    async fn restore_puts_draft_back_in_preview() {
        let arena = DraftArena::new();
        let chat = ChatId(5);
        arena.start(chat).await;
        arena
            .with(chat, |s| {
                s.conversation.submit_text("Roof leaks", limits())?;
                s.conversation.add_attachment(MessageId(1), doc(1), None)?;
                s.conversation.finish_attachments()
            })
            .await
            .unwrap()
            .unwrap();
        let draft = arena.take_confirmed(chat).await.unwrap();

        arena.restore(chat, draft.clone()).await;
        assert_eq!(arena.phase(chat).await, Some("preview"));
        let again = arena.take_confirmed(chat).await.unwrap();
        assert_eq!(again.text, "Roof leaks");
        assert_eq!(again.attachments, draft.attachments);

        // A draft started in the meantime wins.
        arena.start(chat).await;
        arena.restore(chat, again).await;
        assert_eq!(arena.phase(chat).await, Some("awaiting_text"));
    }

    #[tokio::test]
    async fn arena_confirms_only_from_preview() {
        let arena = DraftArena::new();
        let chat = ChatId(42);
        assert!(arena.start(chat).await.is_none());
        arena
            .with(chat, |s| s.conversation.submit_text("No heating", limits()))
            .await
            .unwrap()
            .unwrap();
        assert!(arena.take_confirmed(chat).await.is_none());
        assert_eq!(arena.phase(chat).await, Some("collecting_attachments"));

        arena
            .with(chat, |s| s.conversation.finish_attachments())
            .await
            .unwrap()
            .unwrap();
        let draft = arena.take_confirmed(chat).await.unwrap();
        assert_eq!(draft.text, "No heating");
        assert!(draft.attachments.is_empty());
        assert!(arena.phase(chat).await.is_none());
    }

    #[tokio::test]
    async fn restart_returns_previous_service_message() {
        let arena = DraftArena::new();
        let chat = ChatId(1);
        arena.start(chat).await;
        let msg = MessageRef {
            chat_id: chat,
            message_id: MessageId(9),
        };
        arena
            .with(chat, |s| s.replace_service_message(Some(msg)))
            .await;
        assert_eq!(arena.start(chat).await, Some(msg));
    }

    #[tokio::test]
    async fn prune_drops_idle_drafts() {
        let arena = DraftArena::new();
        arena.start(ChatId(1)).await;
        assert_eq!(arena.prune_idle(Duration::from_secs(3600)).await, 0);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(arena.prune_idle(Duration::ZERO).await, 1);
    }
}
