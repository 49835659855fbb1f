//! Persistence ports.
//!
//! "Not found" is always an absent result (`None` / `false`), never an error.
//! `Err` is reserved for genuine store I/O failure.

pub mod memory;

use async_trait::async_trait;

use crate::{
    domain::{TicketId, TopicRef, UserId},
    ticket::{
        Attachment, DraftAttachment, RequesterProfile, StatusChange, StatusCounts, Ticket,
        TicketPage, TicketStatus, UserProfile,
    },
    Result,
};

pub use memory::MemoryStore;

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Create an OPEN ticket. Text is trimmed and must be non-empty and within
    /// the store's maximum length (`Error::Validation`); an unknown owner is
    /// `Error::NotFound`.
    async fn create(&self, owner: UserId, text: &str) -> Result<Ticket>;

    /// Bind the forum topic once. Returns `false` when the ticket is missing or
    /// already bound; an existing binding is never overwritten.
    async fn bind_forum(&self, ticket_id: TicketId, topic: TopicRef) -> Result<bool>;

    /// The single status mutation point. Atomically reads the current status,
    /// runs the lifecycle decision and writes when it is `Applied`.
    /// `None` when the ticket does not exist.
    async fn set_status(
        &self,
        ticket_id: TicketId,
        target: TicketStatus,
    ) -> Result<Option<StatusChange>>;

    /// Guarded owner cancellation: succeeds only for the owner's own OPEN/WORK
    /// ticket, through the same mutation as `set_status`. `Some` is the
    /// committed change; `None` means nothing was written.
    async fn cancel_if_owner(
        &self,
        owner: UserId,
        ticket_id: TicketId,
    ) -> Result<Option<StatusChange>>;

    async fn find_by_id(&self, ticket_id: TicketId) -> Result<Option<Ticket>>;
    async fn find_by_thread(&self, topic: TopicRef) -> Result<Option<Ticket>>;
    async fn find_for_owner(&self, owner: UserId, ticket_id: TicketId) -> Result<Option<Ticket>>;

    async fn thread_of(&self, ticket_id: TicketId) -> Result<Option<TopicRef>> {
        Ok(self.find_by_id(ticket_id).await?.and_then(|t| t.forum))
    }

    /// Newest first. `owner = None` lists across all owners.
    async fn list_by_status(
        &self,
        owner: Option<UserId>,
        status: TicketStatus,
        page: u32,
        page_size: u32,
    ) -> Result<TicketPage>;

    async fn count_by_status(&self, owner: Option<UserId>) -> Result<StatusCounts>;

    async fn add_attachment(
        &self,
        ticket_id: TicketId,
        attachment: &DraftAttachment,
    ) -> Result<Attachment>;

    /// Oldest first.
    async fn attachments(&self, ticket_id: TicketId) -> Result<Vec<Attachment>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Insert or update by telegram id; returns `true` when newly created.
    async fn register_user(&self, profile: &UserProfile) -> Result<bool>;
    async fn requester_profile(&self, user: UserId) -> Result<Option<RequesterProfile>>;
    /// Removes the user along with their tickets and attachments.
    async fn delete_user(&self, user: UserId) -> Result<bool>;
}

#[async_trait]
pub trait StaffSource: Send + Sync {
    async fn list_staff_ids(&self) -> Result<Vec<UserId>>;
    async fn add_staff(&self, user: UserId, username: &str) -> Result<()>;
}

/// Upper bound on stored ticket body length, in characters.
pub const MAX_TICKET_TEXT_CHARS: usize = 4000;

/// Shared `create` validation: trimmed text, non-empty, bounded.
pub fn normalize_ticket_text(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(crate::Error::Validation("ticket text is empty".to_string()));
    }
    if trimmed.chars().count() > MAX_TICKET_TEXT_CHARS {
        return Err(crate::Error::Validation(format!(
            "ticket text exceeds {MAX_TICKET_TEXT_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}
