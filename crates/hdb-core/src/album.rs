//! Attachment batching for ticket drafts.
//!
//! Telegram delivers an album as separate messages sharing a `media_group_id`
//! and never says when the album is over. Each album arrival bumps the batch
//! generation and asks the caller to schedule a finalize after a quiet period.
//! A finalize carrying an older generation was superseded and does nothing.
//!
//! Generations come from one process-wide sequence, so a finalize scheduled
//! for a discarded batch (edited text, restarted draft) never matches a later
//! batch.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{domain::MessageId, ticket::DraftAttachment};

/// How many recent message ids are remembered for duplicate suppression.
pub const SEEN_CAPACITY: usize = 100;

static GENERATIONS: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    GENERATIONS.fetch_add(1, Ordering::Relaxed)
}

/// Acknowledgement to show the person collecting attachments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ack {
    Single { total: usize },
    AlbumComplete { count: usize, total: usize },
}

/// Handle for a deferred finalize. Only the newest one is honoured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinalizeTicket {
    pub generation: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayStep {
    /// Acknowledgements to emit now, in order.
    pub acks: Vec<Ack>,
    /// When set, run `finalize` with this ticket after the quiet period.
    pub schedule: Option<FinalizeTicket>,
}

impl RelayStep {
    pub fn is_noop(&self) -> bool {
        self.acks.is_empty() && self.schedule.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct OpenAlbum {
    group_id: String,
    count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttachmentBatch {
    attachments: Vec<DraftAttachment>,
    album: Option<OpenAlbum>,
    generation: u64,
    seen: VecDeque<i32>,
}

impl AttachmentBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A batch holding already-collected attachments and no open album.
    pub fn with_attachments(attachments: Vec<DraftAttachment>) -> Self {
        Self {
            attachments,
            ..Self::default()
        }
    }

    pub fn attachments(&self) -> &[DraftAttachment] {
        &self.attachments
    }

    pub fn into_attachments(self) -> Vec<DraftAttachment> {
        self.attachments
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    pub fn has_open_album(&self) -> bool {
        self.album.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record one incoming attachment.
    pub fn push(
        &mut self,
        message_id: MessageId,
        attachment: DraftAttachment,
        group_id: Option<&str>,
    ) -> RelayStep {
        if self.seen.contains(&message_id.0) {
            return RelayStep::default();
        }
        if self.seen.len() == SEEN_CAPACITY {
            self.seen.pop_front();
        }
        self.seen.push_back(message_id.0);

        let mut step = RelayStep::default();
        match group_id {
            None => {
                step.acks.extend(self.close_open_album());
                self.attachments.push(attachment);
                step.acks.push(Ack::Single {
                    total: self.attachments.len(),
                });
            }
            Some(gid) => {
                let same_album = matches!(&self.album, Some(open) if open.group_id == gid);
                if same_album {
                    if let Some(open) = self.album.as_mut() {
                        open.count += 1;
                    }
                } else {
                    step.acks.extend(self.close_open_album());
                    self.album = Some(OpenAlbum {
                        group_id: gid.to_string(),
                        count: 1,
                    });
                }
                self.attachments.push(attachment);
                self.generation = next_generation();
                step.schedule = Some(FinalizeTicket {
                    generation: self.generation,
                });
            }
        }
        step
    }

    /// Deferred finalize. `None` when superseded or when no album is open.
    pub fn finalize(&mut self, ticket: FinalizeTicket) -> Option<Ack> {
        if ticket.generation != self.generation {
            return None;
        }
        self.close_open_album()
    }

    /// Close the open album now, invalidating any pending finalize.
    pub fn close_open_album(&mut self) -> Option<Ack> {
        let open = self.album.take()?;
        self.generation = next_generation();
        Some(Ack::AlbumComplete {
            count: open.count,
            total: self.attachments.len(),
        })
    }

    /// Forget album grouping without acknowledging it (re-entering collection).
    pub fn reset_album(&mut self) {
        if self.album.take().is_some() {
            self.generation = next_generation();
        }
    }

    /// Drop everything collected so far.
    pub fn clear(&mut self) {
        self.attachments.clear();
        self.reset_album();
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::MediaKind;

    fn photo(n: i32) -> DraftAttachment {
        DraftAttachment {
            kind: MediaKind::Photo,
            file_id: format!("photo-{n}"),
            file_unique_id: None,
            caption: None,
        }
    }

    #[test]
    fn five_in_one_album_acknowledge_once() {
        let mut batch = AttachmentBatch::new();
        let mut tickets = Vec::new();
        for n in 1..=5 {
            let step = batch.push(MessageId(n), photo(n), Some("g1"));
            assert!(step.acks.is_empty());
            tickets.push(step.schedule.unwrap());
        }

        let acks: Vec<Ack> = tickets.iter().filter_map(|t| batch.finalize(*t)).collect();
        assert_eq!(acks, vec![Ack::AlbumComplete { count: 5, total: 5 }]);
        // The winning finalize closed the album.
        assert!(!batch.has_open_album());
        assert_eq!(batch.finalize(*tickets.last().unwrap()), None);
    }

    #[test]
    fn new_group_closes_previous_with_its_own_count() {
        let mut batch = AttachmentBatch::new();
        let first = batch.push(MessageId(1), photo(1), Some("g1"));
        let second = batch.push(MessageId(2), photo(2), Some("g2"));

        assert_eq!(second.acks, vec![Ack::AlbumComplete { count: 1, total: 1 }]);
        assert_eq!(batch.finalize(first.schedule.unwrap()), None);
        assert_eq!(
            batch.finalize(second.schedule.unwrap()),
            Some(Ack::AlbumComplete { count: 1, total: 2 })
        );
    }

    #[test]
    fn single_attachment_flushes_open_album_first() {
        let mut batch = AttachmentBatch::new();
        let a = batch.push(MessageId(1), photo(1), Some("g1"));
        batch.push(MessageId(2), photo(2), Some("g1"));
        let step = batch.push(MessageId(3), photo(3), None);
        assert_eq!(
            step.acks,
            vec![
                Ack::AlbumComplete { count: 2, total: 2 },
                Ack::Single { total: 3 }
            ]
        );
        assert_eq!(step.schedule, None);
        assert_eq!(batch.finalize(a.schedule.unwrap()), None);
    }

    #[test]
    fn duplicate_message_ids_are_ignored() {
        let mut batch = AttachmentBatch::new();
        batch.push(MessageId(1), photo(1), None);
        assert!(batch.push(MessageId(1), photo(1), None).is_noop());
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn seen_set_is_bounded() {
        let mut batch = AttachmentBatch::new();
        for n in 0..(SEEN_CAPACITY as i32 + 1) {
            batch.push(MessageId(n), photo(n), None);
        }
        // Id 0 fell out of the window and is accepted again.
        assert!(!batch.push(MessageId(0), photo(0), None).is_noop());
        assert_eq!(batch.len(), SEEN_CAPACITY + 2);
    }

    #[test]
    fn finalize_from_a_discarded_batch_never_matches_a_new_one() {
        let mut old = AttachmentBatch::new();
        let stale = old.push(MessageId(1), photo(1), Some("g1")).schedule.unwrap();

        let mut fresh = AttachmentBatch::new();
        let current = fresh.push(MessageId(2), photo(2), Some("g2")).schedule.unwrap();
        assert_ne!(stale, current);
        assert_eq!(fresh.finalize(stale), None);
        assert!(fresh.has_open_album());
        assert_eq!(
            fresh.finalize(current),
            Some(Ack::AlbumComplete { count: 1, total: 1 })
        );
    }

    #[test]
    fn reset_album_invalidates_pending_finalize() {
        let mut batch = AttachmentBatch::new();
        let step = batch.push(MessageId(1), photo(1), Some("g1"));
        batch.reset_album();
        assert_eq!(batch.finalize(step.schedule.unwrap()), None);
        assert_eq!(batch.len(), 1);
    }
}
