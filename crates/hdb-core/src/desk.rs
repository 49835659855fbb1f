//! Ticket desk: the operations the transport layer calls into.
//!
//! Every status change goes through `TicketStore::set_status` (or its guarded
//! owner variant). Store failures propagate before any external effect runs;
//! topic cosmetics and notifications after a commit are best-effort.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    audit::{AuditEvent, AuditLogger},
    config::Config,
    domain::{ChatId, MessageRef, Recipient, ThreadId, TicketId, TopicRef, UserId},
    drafts::ConfirmedDraft,
    forum::{status_announcement, ForumSync, SyncReport},
    keyboards,
    messaging::{port::MessagingPort, types::OutboundMedia},
    notify::{
        new_ticket_summary, owner_cancel_text, owner_status_text, relay_header,
        staff_recipients, topic_summary, DeliveryReport, FanOut,
    },
    staff::StaffDirectory,
    store::{TicketStore, UserDirectory},
    ticket::{
        lifecycle::side_effects, RequesterProfile, StatusChange, StatusCounts, StatusSource,
        Ticket, TicketPage, TicketStatus, TransitionOutcome, UserProfile,
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct DeskSettings {
    /// Forum supergroup holding one topic per ticket.
    pub channel: ChatId,
    pub page_size: u32,
    pub utc_offset_hours: i32,
}

impl From<&Config> for DeskSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            channel: cfg.notification_channel_id,
            page_size: cfg.ticket_page_size,
            utc_offset_hours: cfg.display_utc_offset_hours,
        }
    }
}

/// Why a topic-scoped staff action was not carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Denial {
    /// Actor is not staff, or the action happened outside the channel.
    AccessDenied,
    NotInTopic,
    /// No ticket is bound to this topic.
    NotFound,
}

#[derive(Clone, Copy, Debug)]
pub struct StatusRequest {
    pub source: StatusSource,
    pub actor: UserId,
    pub chat: ChatId,
    pub thread: Option<ThreadId>,
    /// Ticket the button was rendered for; slash commands leave it empty.
    pub ticket_id: Option<TicketId>,
    pub target: TicketStatus,
    /// Panel message to refresh after a click.
    pub panel: Option<MessageRef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusOutcome {
    Denied(Denial),
    /// The panel was rendered for another ticket than the topic's.
    TicketMismatch,
    Changed {
        change: StatusChange,
        sync: SyncReport,
        owner_notified: bool,
    },
    AlreadyInStatus {
        change: StatusChange,
        announced: bool,
    },
    Rejected {
        change: StatusChange,
    },
}

/// Short feedback for the acting staff member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    /// Shown as a modal alert rather than a toast.
    pub alert: bool,
}

impl Notice {
    pub fn toast(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alert: false,
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alert: true,
        }
    }
}

impl Denial {
    pub fn notice(self) -> Notice {
        match self {
            Self::AccessDenied => Notice::alert("⛔ Access denied."),
            Self::NotInTopic => Notice::toast("This command only works inside a ticket topic."),
            Self::NotFound => Notice::alert("⚠️ No ticket found for this topic."),
        }
    }
}

impl StatusOutcome {
    pub fn notice(&self) -> Notice {
        match self {
            Self::Denied(d) => d.notice(),
            Self::TicketMismatch => Notice::alert("⚠️ This panel belongs to another ticket."),
            Self::Changed { change, .. } => {
                Notice::toast(format!("✅ Status changed to: {}", change.to.label()))
            }
            Self::AlreadyInStatus { change, .. } => {
                Notice::toast(format!("ℹ️ Ticket already has status: {}", change.to.label()))
            }
            Self::Rejected { change } => Notice::alert(format!(
                "🔒 Ticket #{} is closed, its status can no longer change.",
                change.ticket_id
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Submission {
    pub ticket: Ticket,
    pub topic: Option<TopicRef>,
    pub attachments_saved: usize,
    pub attachments_relayed: usize,
    pub staff: DeliveryReport,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Not the caller's ticket, missing, or already closed. Nothing changed.
    Refused,
    Cancelled {
        change: StatusChange,
        sync: Option<SyncReport>,
        staff: DeliveryReport,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Not a staff message in a ticket topic of the channel.
    Skipped,
    NoTicket,
    Delivered { ticket_id: TicketId },
    Failed { ticket_id: TicketId },
}

pub struct TicketDesk {
    tickets: Arc<dyn TicketStore>,
    users: Arc<dyn UserDirectory>,
    staff: Arc<StaffDirectory>,
    messenger: Arc<dyn MessagingPort>,
    forum: ForumSync,
    fanout: FanOut,
    audit: AuditLogger,
    settings: DeskSettings,
}

impl TicketDesk {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        users: Arc<dyn UserDirectory>,
        staff: Arc<StaffDirectory>,
        messenger: Arc<dyn MessagingPort>,
        audit: AuditLogger,
        settings: DeskSettings,
    ) -> Self {
        Self {
            forum: ForumSync::new(Arc::clone(&messenger)),
            fanout: FanOut::new(Arc::clone(&messenger)),
            tickets,
            users,
            staff,
            messenger,
            audit,
            settings,
        }
    }

    pub fn settings(&self) -> DeskSettings {
        self.settings
    }

    pub fn is_staff(&self, user: UserId) -> bool {
        self.staff.is_staff(user)
    }

    pub async fn register_user(&self, profile: &UserProfile) -> Result<bool> {
        self.users.register_user(profile).await
    }

    pub async fn requester(&self, user: UserId) -> Result<Option<RequesterProfile>> {
        self.users.requester_profile(user).await
    }

    /// Staff + channel + topic checks shared by every topic-scoped action.
    async fn resolve_topic(
        &self,
        source: StatusSource,
        actor: UserId,
        chat: ChatId,
        thread: Option<ThreadId>,
    ) -> Result<std::result::Result<(TopicRef, Ticket), Denial>> {
        if chat != self.settings.channel || !self.staff.is_staff(actor) {
            let reason = if chat != self.settings.channel {
                "outside notification channel"
            } else {
                "not staff"
            };
            self.audit
                .record(AuditEvent::access_denied(actor, source, reason));
            return Ok(Err(Denial::AccessDenied));
        }
        let Some(thread_id) = thread else {
            return Ok(Err(Denial::NotInTopic));
        };
        let topic = TopicRef {
            chat_id: chat,
            thread_id,
        };
        match self.tickets.find_by_thread(topic).await? {
            Some(ticket) => Ok(Ok((topic, ticket))),
            None => Ok(Err(Denial::NotFound)),
        }
    }

    /// Staff status change from a panel button or a topic slash command.
    pub async fn change_status(&self, req: StatusRequest) -> Result<StatusOutcome> {
        let (topic, ticket) = match self
            .resolve_topic(req.source, req.actor, req.chat, req.thread)
            .await?
        {
            Ok(found) => found,
            Err(denial) => return Ok(StatusOutcome::Denied(denial)),
        };
        if req.ticket_id.is_some_and(|id| id != ticket.id) {
            return Ok(StatusOutcome::TicketMismatch);
        }

        let Some(change) = self.tickets.set_status(ticket.id, req.target).await? else {
            return Ok(StatusOutcome::Denied(Denial::NotFound));
        };
        self.audit.record(AuditEvent::status_change(
            req.actor,
            change.ticket_id,
            change.from,
            change.to,
            req.source,
            change.outcome,
        ));
        info!(
            ticket_id = change.ticket_id.0,
            from = change.from.as_str(),
            to = change.to.as_str(),
            source = req.source.as_str(),
            outcome = ?change.outcome,
            "status change"
        );

        let fx = side_effects(&change, req.source, req.source == StatusSource::Panel);
        let announcement = status_announcement(change.ticket_id, change.to);
        let sync = self
            .forum
            .apply(topic, change.ticket_id, change.to, fx, &announcement)
            .await;

        let owner_notified = if fx.notify_owner {
            self.fanout
                .notify_owner(change.owner, &owner_status_text(change.ticket_id, change.to))
                .await
        } else {
            false
        };

        if change.outcome != TransitionOutcome::Rejected {
            if let Some(panel) = req.panel {
                if let Err(e) = self
                    .messenger
                    .edit_keyboard(panel, keyboards::status_panel(change.ticket_id))
                    .await
                {
                    warn!(ticket_id = change.ticket_id.0, error = %e, "panel refresh failed");
                }
            }
        }

        Ok(match change.outcome {
            TransitionOutcome::Applied => StatusOutcome::Changed {
                change,
                sync,
                owner_notified,
            },
            TransitionOutcome::AlreadyInStatus => StatusOutcome::AlreadyInStatus {
                change,
                announced: sync.announced == crate::forum::StepResult::Done,
            },
            TransitionOutcome::Rejected => StatusOutcome::Rejected { change },
        })
    }

    /// `/panel` inside a ticket topic.
    pub async fn post_panel(
        &self,
        actor: UserId,
        chat: ChatId,
        thread: Option<ThreadId>,
    ) -> Result<std::result::Result<MessageRef, Denial>> {
        let (topic, ticket) = match self
            .resolve_topic(StatusSource::Panel, actor, chat, thread)
            .await?
        {
            Ok(found) => found,
            Err(denial) => return Ok(Err(denial)),
        };
        let text = format!(
            "🔧 Ticket #{} control panel\nStatus: <b>{}</b>",
            ticket.id,
            ticket.status.label()
        );
        let msg = self
            .messenger
            .send_keyboard(topic.into(), &text, keyboards::status_panel(ticket.id))
            .await?;
        Ok(Ok(msg))
    }

    /// Create a ticket from a confirmed draft and mirror it to staff.
    pub async fn submit(&self, owner: UserId, draft: ConfirmedDraft) -> Result<Submission> {
        let ticket = self.tickets.create(owner, &draft.text).await?;
        info!(ticket_id = ticket.id.0, owner = owner.0, attachments = draft.attachments.len(), "ticket created");

        let mut attachments_saved = 0;
        for a in &draft.attachments {
            match self.tickets.add_attachment(ticket.id, a).await {
                Ok(_) => attachments_saved += 1,
                Err(e) => {
                    warn!(ticket_id = ticket.id.0, kind = a.kind.as_str(), error = %e, "saving attachment failed")
                }
            }
        }

        let profile = match self.users.requester_profile(owner).await {
            Ok(p) => p,
            Err(e) => {
                warn!(ticket_id = ticket.id.0, error = %e, "requester profile lookup failed");
                None
            }
        };

        let tz = self.settings.utc_offset_hours;
        let mut attachments_relayed = 0;
        let topic = self.forum.open_topic(self.settings.channel, ticket.id).await;
        if let Some(topic) = topic {
            match self.tickets.bind_forum(ticket.id, topic).await {
                Ok(true) => {}
                Ok(false) => warn!(ticket_id = ticket.id.0, "forum binding not stored"),
                Err(e) => warn!(ticket_id = ticket.id.0, error = %e, "forum binding failed"),
            }
            let summary = topic_summary(&ticket, profile.as_ref(), tz);
            if let Err(e) = self
                .messenger
                .send_keyboard(topic.into(), &summary, keyboards::status_panel(ticket.id))
                .await
            {
                warn!(ticket_id = ticket.id.0, error = %e, "topic summary failed");
            }
            let media: Vec<OutboundMedia> =
                draft.attachments.iter().map(OutboundMedia::from).collect();
            attachments_relayed = self
                .forum
                .relay_attachments(topic, ticket.id, &media)
                .await;
        }

        let recipients = staff_recipients(&self.staff.snapshot(), Some(owner));
        let staff = self
            .fanout
            .broadcast(
                &recipients,
                &new_ticket_summary(&ticket, profile.as_ref(), tz),
            )
            .await;

        self.audit.record(AuditEvent::ticket_created(
            owner,
            ticket.id,
            &ticket.text,
            attachments_saved,
        ));

        let confirmation = format!("✅ Ticket #{} created.", ticket.id);
        if let Err(e) = self
            .messenger
            .send_keyboard(
                Recipient::user(owner),
                &confirmation,
                keyboards::ticket_menu(Some(ticket.id)),
            )
            .await
        {
            warn!(ticket_id = ticket.id.0, error = %e, "owner confirmation failed");
        }

        Ok(Submission {
            ticket,
            topic,
            attachments_saved,
            attachments_relayed,
            staff,
        })
    }

    /// Owner self-service cancellation, mirrored to the topic and to staff.
    pub async fn cancel_by_owner(&self, owner: UserId, ticket_id: TicketId) -> Result<CancelOutcome> {
        let Some(change) = self.tickets.cancel_if_owner(owner, ticket_id).await? else {
            self.audit
                .record(AuditEvent::owner_cancel(owner, ticket_id, false));
            return Ok(CancelOutcome::Refused);
        };
        self.audit
            .record(AuditEvent::owner_cancel(owner, ticket_id, true));
        info!(ticket_id = ticket_id.0, owner = owner.0, "ticket cancelled by owner");

        let fx = side_effects(&change, StatusSource::OwnerCancel, false);
        let notice = owner_cancel_text(ticket_id);

        let topic = match self.tickets.thread_of(ticket_id).await {
            Ok(t) => t,
            Err(e) => {
                warn!(ticket_id = ticket_id.0, error = %e, "thread lookup failed");
                None
            }
        };
        let sync = match topic {
            Some(topic) => Some(
                self.forum
                    .apply(topic, ticket_id, change.to, fx, &notice)
                    .await,
            ),
            None => {
                self.forum
                    .post(Recipient::chat(self.settings.channel), &notice)
                    .await;
                None
            }
        };

        let staff = if fx.notify_staff {
            let recipients = staff_recipients(&self.staff.snapshot(), Some(owner));
            self.fanout.broadcast(&recipients, &notice).await
        } else {
            DeliveryReport::default()
        };

        Ok(CancelOutcome::Cancelled {
            change,
            sync,
            staff,
        })
    }

    /// Relay a staff message written in a ticket topic to the ticket owner.
    ///
    /// The caller filters out commands, bot-authored and service messages.
    pub async fn relay_staff_message(
        &self,
        actor: UserId,
        chat: ChatId,
        thread: Option<ThreadId>,
        message: MessageRef,
    ) -> Result<RelayOutcome> {
        if chat != self.settings.channel || !self.staff.is_staff(actor) {
            return Ok(RelayOutcome::Skipped);
        }
        let Some(thread_id) = thread else {
            return Ok(RelayOutcome::Skipped);
        };
        let topic = TopicRef {
            chat_id: chat,
            thread_id,
        };
        let Some(ticket) = self.tickets.find_by_thread(topic).await? else {
            warn!(chat_id = chat.0, thread_id = thread_id.0, "no ticket for topic");
            return Ok(RelayOutcome::NoTicket);
        };

        let to = Recipient::user(ticket.owner);
        let sent = match self.messenger.send_html(to, &relay_header(ticket.id)).await {
            Ok(_) => self.messenger.copy_message(to, message).await.map(|_| ()),
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => Ok(RelayOutcome::Delivered {
                ticket_id: ticket.id,
            }),
            Err(e) => {
                warn!(ticket_id = ticket.id.0, owner = ticket.owner.0, error = %e, "relay to owner failed");
                Ok(RelayOutcome::Failed {
                    ticket_id: ticket.id,
                })
            }
        }
    }

    pub async fn history(&self, owner: UserId, status: TicketStatus, page: u32) -> Result<TicketPage> {
        let mut listing = self
            .tickets
            .list_by_status(Some(owner), status, page, self.settings.page_size)
            .await?;
        // Clamp past-the-end pages to the last one.
        let last = listing.page_count().max(1);
        if listing.page > last {
            listing = self
                .tickets
                .list_by_status(Some(owner), status, last, self.settings.page_size)
                .await?;
        }
        Ok(listing)
    }

    pub async fn history_counts(&self, owner: UserId) -> Result<StatusCounts> {
        self.tickets.count_by_status(Some(owner)).await
    }

    /// The owner's ticket plus their formatted address.
    pub async fn owned_ticket(
        &self,
        owner: UserId,
        ticket_id: TicketId,
    ) -> Result<Option<(Ticket, Option<String>)>> {
        let Some(ticket) = self.tickets.find_for_owner(owner, ticket_id).await? else {
            return Ok(None);
        };
        let address = self
            .users
            .requester_profile(owner)
            .await?
            .and_then(|p| p.address);
        Ok(Some((ticket, address)))
    }

    /// Newest OPEN/WORK ticket of the owner, for the menu shortcut.
    pub async fn active_ticket(&self, owner: UserId) -> Result<Option<TicketId>> {
        let mut newest: Option<Ticket> = None;
        for status in [TicketStatus::Open, TicketStatus::Work] {
            let page = self.tickets.list_by_status(Some(owner), status, 1, 1).await?;
            if let Some(t) = page.items.into_iter().next() {
                if newest.as_ref().map_or(true, |n| t.created_at > n.created_at) {
                    newest = Some(t);
                }
            }
        }
        Ok(newest.map(|t| t.id))
    }
}
