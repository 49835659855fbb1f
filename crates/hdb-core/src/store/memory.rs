use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    domain::{TicketId, TopicRef, UserId},
    errors::Error,
    store::{normalize_ticket_text, StaffSource, TicketStore, UserDirectory},
    ticket::{
        lifecycle, page_offset, Attachment, DraftAttachment, RequesterProfile, StatusChange,
        StatusCounts, Ticket, TicketPage, TicketStatus, TransitionOutcome, UserProfile,
    },
    Result,
};

#[derive(Default)]
struct Inner {
    users: BTreeMap<i64, UserProfile>,
    staff: BTreeMap<i64, String>,
    tickets: BTreeMap<i64, Ticket>,
    attachments: Vec<Attachment>,
    next_ticket_id: i64,
    next_attachment_id: i64,
}

/// Process-local store. Used in tests and as a drop-in when no database is wanted.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_string()))
    }
}

fn transition(ticket: &mut Ticket, target: TicketStatus) -> StatusChange {
    let outcome = lifecycle::decide(ticket.status, target);
    let change = StatusChange {
        ticket_id: ticket.id,
        from: ticket.status,
        to: target,
        owner: ticket.owner,
        outcome,
    };
    if outcome == TransitionOutcome::Applied {
        ticket.status = target;
        ticket.updated_at = Utc::now();
    }
    change
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn create(&self, owner: UserId, text: &str) -> Result<Ticket> {
        let text = normalize_ticket_text(text)?;
        let mut inner = self.lock()?;
        if !inner.users.contains_key(&owner.0) {
            return Err(Error::NotFound(format!("user {}", owner.0)));
        }
        inner.next_ticket_id += 1;
        let now = Utc::now();
        let ticket = Ticket {
            id: TicketId(inner.next_ticket_id),
            owner,
            text,
            status: TicketStatus::Open,
            created_at: now,
            updated_at: now,
            forum: None,
        };
        inner.tickets.insert(ticket.id.0, ticket.clone());
        Ok(ticket)
    }

    async fn bind_forum(&self, ticket_id: TicketId, topic: TopicRef) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.tickets.get_mut(&ticket_id.0) {
            Some(t) if t.forum.is_none() => {
                t.forum = Some(topic);
                t.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_status(
        &self,
        ticket_id: TicketId,
        target: TicketStatus,
    ) -> Result<Option<StatusChange>> {
        let mut inner = self.lock()?;
        Ok(inner
            .tickets
            .get_mut(&ticket_id.0)
            .map(|t| transition(t, target)))
    }

    async fn cancel_if_owner(
        &self,
        owner: UserId,
        ticket_id: TicketId,
    ) -> Result<Option<StatusChange>> {
        let mut inner = self.lock()?;
        let Some(ticket) = inner.tickets.get_mut(&ticket_id.0) else {
            return Ok(None);
        };
        if ticket.owner != owner || !ticket.status.is_active() {
            return Ok(None);
        }
        Ok(Some(transition(ticket, TicketStatus::Cancelled)))
    }

    async fn find_by_id(&self, ticket_id: TicketId) -> Result<Option<Ticket>> {
        Ok(self.lock()?.tickets.get(&ticket_id.0).cloned())
    }

    async fn find_by_thread(&self, topic: TopicRef) -> Result<Option<Ticket>> {
        Ok(self
            .lock()?
            .tickets
            .values()
            .find(|t| t.forum == Some(topic))
            .cloned())
    }

    async fn find_for_owner(&self, owner: UserId, ticket_id: TicketId) -> Result<Option<Ticket>> {
        Ok(self
            .lock()?
            .tickets
            .get(&ticket_id.0)
            .filter(|t| t.owner == owner)
            .cloned())
    }

    async fn list_by_status(
        &self,
        owner: Option<UserId>,
        status: TicketStatus,
        page: u32,
        page_size: u32,
    ) -> Result<TicketPage> {
        let inner = self.lock()?;
        let mut matching: Vec<&Ticket> = inner
            .tickets
            .values()
            .filter(|t| t.status == status && owner.map_or(true, |o| t.owner == o))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let page = page.max(1);
        let items = matching
            .iter()
            .skip(page_offset(page, page_size) as usize)
            .take(page_size as usize)
            .map(|t| (*t).clone())
            .collect();
        Ok(TicketPage {
            items,
            total: matching.len() as u64,
            page,
            page_size,
        })
    }

    async fn count_by_status(&self, owner: Option<UserId>) -> Result<StatusCounts> {
        let inner = self.lock()?;
        let mut counts = StatusCounts::default();
        inner
            .tickets
            .values()
            .filter(|t| owner.map_or(true, |o| t.owner == o))
            .for_each(|t| counts.bump(t.status));
        Ok(counts)
    }

    async fn add_attachment(
        &self,
        ticket_id: TicketId,
        attachment: &DraftAttachment,
    ) -> Result<Attachment> {
        let mut inner = self.lock()?;
        if !inner.tickets.contains_key(&ticket_id.0) {
            return Err(Error::NotFound(format!("ticket {ticket_id}")));
        }
        inner.next_attachment_id += 1;
        let row = Attachment {
            id: inner.next_attachment_id,
            ticket_id,
            kind: attachment.kind,
            file_id: attachment.file_id.clone(),
            file_unique_id: attachment.file_unique_id.clone(),
            caption: attachment.caption.clone(),
            created_at: Utc::now(),
        };
        inner.attachments.push(row.clone());
        Ok(row)
    }

    async fn attachments(&self, ticket_id: TicketId) -> Result<Vec<Attachment>> {
        Ok(self
            .lock()?
            .attachments
            .iter()
            .filter(|a| a.ticket_id == ticket_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn register_user(&self, profile: &UserProfile) -> Result<bool> {
        let mut inner = self.lock()?;
        let created = !inner.users.contains_key(&profile.telegram_id);
        inner.users.insert(profile.telegram_id, profile.clone());
        Ok(created)
    }

    async fn requester_profile(&self, user: UserId) -> Result<Option<RequesterProfile>> {
        Ok(self.lock()?.users.get(&user.0).map(RequesterProfile::from))
    }

    async fn delete_user(&self, user: UserId) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.users.remove(&user.0).is_none() {
            return Ok(false);
        }
        let owned: Vec<i64> = inner
            .tickets
            .values()
            .filter(|t| t.owner == user)
            .map(|t| t.id.0)
            .collect();
        for id in &owned {
            inner.tickets.remove(id);
        }
        inner
            .attachments
            .retain(|a| !owned.contains(&a.ticket_id.0));
        Ok(true)
    }
}

#[async_trait]
impl StaffSource for MemoryStore {
    async fn list_staff_ids(&self) -> Result<Vec<UserId>> {
        Ok(self.lock()?.staff.keys().copied().map(UserId).collect())
    }

    async fn add_staff(&self, user: UserId, username: &str) -> Result<()> {
        self.lock()?.staff.insert(user.0, username.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, ThreadId};
    use crate::ticket::MediaKind;

    async fn store_with_user(id: i64) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .register_user(&UserProfile {
                telegram_id: id,
                username: format!("user{id}"),
                name: "Resident".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
    }

    fn topic(thread: i32) -> TopicRef {
        TopicRef {
            chat_id: ChatId(-100),
            thread_id: ThreadId(thread),
        }
    }

    #[tokio::test]
    async fn create_requires_known_owner_and_text() {
        let store = store_with_user(1).await;
        assert!(matches!(
            store.create(UserId(2), "Leaking pipe").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.create(UserId(1), "   ").await,
            Err(Error::Validation(_))
        ));
        let t = store.create(UserId(1), "  Leaking pipe  ").await.unwrap();
        assert_eq!(t.text, "Leaking pipe");
        assert_eq!(t.status, TicketStatus::Open);
        assert_eq!(t.forum, None);
    }

    #[tokio::test]
    async fn binding_is_set_once() {
        let store = store_with_user(1).await;
        let t = store.create(UserId(1), "Broken door").await.unwrap();
        assert!(store.bind_forum(t.id, topic(10)).await.unwrap());
        assert!(!store.bind_forum(t.id, topic(11)).await.unwrap());
        assert!(!store.bind_forum(TicketId(999), topic(12)).await.unwrap());
        assert_eq!(store.thread_of(t.id).await.unwrap(), Some(topic(10)));
        assert_eq!(
            store.find_by_thread(topic(10)).await.unwrap().map(|t| t.id),
            Some(t.id)
        );
        assert!(store.find_by_thread(topic(11)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_status_follows_lifecycle() {
        let store = store_with_user(1).await;
        let t = store.create(UserId(1), "No hot water").await.unwrap();

        let c = store.set_status(t.id, TicketStatus::Work).await.unwrap().unwrap();
        assert_eq!((c.from, c.to, c.owner), (TicketStatus::Open, TicketStatus::Work, UserId(1)));
        assert!(c.applied());

        let again = store.set_status(t.id, TicketStatus::Work).await.unwrap().unwrap();
        assert_eq!(again.outcome, TransitionOutcome::AlreadyInStatus);

        store.set_status(t.id, TicketStatus::Cancelled).await.unwrap();
        let back = store.set_status(t.id, TicketStatus::Open).await.unwrap().unwrap();
        assert_eq!(back.outcome, TransitionOutcome::Rejected);
        let row = store.find_by_id(t.id).await.unwrap().unwrap();
        assert_eq!(row.status, TicketStatus::Cancelled);

        assert!(store
            .set_status(TicketId(404), TicketStatus::Work)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn cancel_if_owner_is_guarded() {
        let store = store_with_user(1).await;
        store
            .register_user(&UserProfile {
                telegram_id: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        let t = store.create(UserId(1), "Elevator stuck").await.unwrap();

        assert!(store.cancel_if_owner(UserId(2), t.id).await.unwrap().is_none());
        assert_eq!(
            store.find_by_id(t.id).await.unwrap().unwrap().status,
            TicketStatus::Open
        );

        let c = store.cancel_if_owner(UserId(1), t.id).await.unwrap().unwrap();
        assert!(c.applied());
        assert!(store.cancel_if_owner(UserId(1), t.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_is_paged_newest_first() {
        let store = store_with_user(1).await;
        for i in 0..7 {
            store.create(UserId(1), &format!("ticket {i}")).await.unwrap();
        }
        let page = store
            .list_by_status(Some(UserId(1)), TicketStatus::Open, 2, 5)
            .await
            .unwrap();
        assert_eq!(page.total, 7);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, TicketId(2));
        assert!(!page.has_next());

        let counts = store.count_by_status(None).await.unwrap();
        assert_eq!((counts.open, counts.active()), (7, 7));
    }

    #[tokio::test]
    async fn deleting_user_cascades() {
        let store = store_with_user(1).await;
        let t = store.create(UserId(1), "Window cracked").await.unwrap();
        store
            .add_attachment(
                t.id,
                &DraftAttachment {
                    kind: MediaKind::Photo,
                    file_id: "p1".into(),
                    file_unique_id: None,
                    caption: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(store.attachments(t.id).await.unwrap().len(), 1);

        assert!(store.delete_user(UserId(1)).await.unwrap());
        assert!(store.find_by_id(t.id).await.unwrap().is_none());
        assert!(store.attachments(t.id).await.unwrap().is_empty());
    }
}
