//! Resident side: registration, the draft conversation and ticket history.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{Message, User},
};
use tracing::{debug, info, warn};

use hdb_core::{
    commands::{parse_command, TicketAction},
    config::TextLimits,
    desk::{CancelOutcome, Notice},
    domain::{ChatId, MessageId, MessageRef, Recipient, TicketId, UserId},
    drafts::{ConfirmedDraft, DraftError},
    formatting::{history_header, history_menu_text, preview_text, ticket_card},
    keyboards,
    messaging::types::InlineKeyboard,
    ticket::UserProfile,
};

use crate::router::AppState;

use super::{attachments, say, GENERIC_FAILURE};

const MENU_TEXT: &str = "🏠 <b>Main menu</b>\nReport a problem or check your tickets.";
const DRAFT_EXPIRED: &str = "⌛ This draft is no longer available. Start a new ticket.";
const STALE_BUTTON: &str = "This button is no longer active.";
const SUBMIT_FAILED: &str =
    "⚠️ The ticket could not be saved. Your draft is kept, press «Submit» to try again.";

fn text_prompt(limits: TextLimits) -> String {
    format!(
        "📝 Describe the problem in one message ({}-{} characters).",
        limits.min_len, limits.max_len
    )
}

pub async fn handle_private_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let owner = UserId(user.id.0 as i64);
    let chat = ChatId(msg.chat.id.0);

    if let Some(text) = msg.text() {
        if let Some((cmd, _)) = parse_command(text) {
            match cmd.as_str() {
                "start" => start(&state, user, chat).await,
                "menu" => show_menu(&state, owner, chat, None).await,
                "new" => {
                    if let Some(notice) = begin_draft(&state, owner, chat, None).await {
                        say(&state, Recipient::chat(chat), &notice.text).await;
                    }
                }
                "history" => show_filters(&state, owner, chat, None).await,
                _ => say(&state, Recipient::chat(chat), "Unknown command. Use /menu.").await,
            }
            return Ok(());
        }
        on_text(&state, owner, chat, text).await;
        return Ok(());
    }

    if let Some(attachment) = attachments::extract(&msg) {
        attachments::on_attachment(
            &state,
            owner,
            chat,
            MessageId(msg.id.0),
            attachment,
            msg.media_group_id(),
        )
        .await;
    }
    Ok(())
}

/// Register unknown senders from their Telegram profile, then show the menu.
async fn start(state: &AppState, user: &User, chat: ChatId) {
    let owner = UserId(user.id.0 as i64);
    match state.desk.requester(owner).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            let profile = UserProfile {
                telegram_id: owner.0,
                username: user.username.clone().unwrap_or_default(),
                name: user.full_name(),
                ..UserProfile::default()
            };
            if let Err(e) = state.desk.register_user(&profile).await {
                warn!(user_id = owner.0, error = %e, "registration failed");
                say(state, Recipient::chat(chat), GENERIC_FAILURE).await;
                return;
            }
            info!(user_id = owner.0, "resident registered");
        }
        Err(e) => {
            warn!(user_id = owner.0, error = %e, "profile lookup failed");
            say(state, Recipient::chat(chat), GENERIC_FAILURE).await;
            return;
        }
    }
    show_menu(state, owner, chat, None).await;
}

/// Edit `origin` in place when given, otherwise (or when the edit fails) send anew.
async fn present(
    state: &AppState,
    chat: ChatId,
    origin: Option<MessageRef>,
    html: &str,
    keyboard: InlineKeyboard,
) -> Option<MessageRef> {
    if let Some(m) = origin {
        match state.messenger.edit_html(m, html, Some(keyboard.clone())).await {
            Ok(()) => return Some(m),
            Err(e) => debug!(chat_id = chat.0, error = %e, "edit failed; sending a new message"),
        }
    }
    match state
        .messenger
        .send_keyboard(Recipient::chat(chat), html, keyboard)
        .await
    {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(chat_id = chat.0, error = %e, "send failed");
            None
        }
    }
}

/// Show a draft prompt and make it the chat's current service message.
pub(super) async fn show_service(
    state: &AppState,
    chat: ChatId,
    origin: Option<MessageRef>,
    html: &str,
    keyboard: InlineKeyboard,
) {
    let Some(shown) = present(state, chat, origin, html, keyboard).await else {
        return;
    };
    let previous = state
        .drafts
        .with(chat, |slot| slot.replace_service_message(Some(shown)))
        .await
        .flatten();
    if let Some(old) = previous.filter(|old| *old != shown) {
        drop_message(state, old).await;
    }
}

async fn drop_message(state: &AppState, msg: MessageRef) {
    // The resident may have deleted it already.
    if let Err(e) = state.messenger.delete_message(msg).await {
        debug!(chat_id = msg.chat_id.0, error = %e, "service message delete failed");
    }
}

pub(super) async fn show_menu(state: &AppState, owner: UserId, chat: ChatId, origin: Option<MessageRef>) {
    let active = match state.desk.active_ticket(owner).await {
        Ok(id) => id,
        Err(e) => {
            warn!(user_id = owner.0, error = %e, "active ticket lookup failed");
            None
        }
    };
    present(state, chat, origin, MENU_TEXT, keyboards::ticket_menu(active)).await;
}

async fn show_filters(state: &AppState, owner: UserId, chat: ChatId, origin: Option<MessageRef>) {
    match state.desk.history_counts(owner).await {
        Ok(counts) => {
            present(
                state,
                chat,
                origin,
                &history_menu_text(&counts),
                keyboards::history_filters(),
            )
            .await;
        }
        Err(e) => {
            warn!(user_id = owner.0, error = %e, "history counts failed");
            say(state, Recipient::chat(chat), GENERIC_FAILURE).await;
        }
    }
}

/// Start a fresh draft. Returns a notice when the resident is not registered.
async fn begin_draft(
    state: &AppState,
    owner: UserId,
    chat: ChatId,
    origin: Option<MessageRef>,
) -> Option<Notice> {
    match state.desk.requester(owner).await {
        Ok(Some(_)) => {}
        Ok(None) => return Some(Notice::alert("Please send /start first.")),
        Err(e) => {
            warn!(user_id = owner.0, error = %e, "profile lookup failed");
            return Some(Notice::alert(GENERIC_FAILURE));
        }
    }
    if let Some(old) = state.drafts.start(chat).await {
        if Some(old) != origin {
            drop_message(state, old).await;
        }
    }
    show_service(
        state,
        chat,
        origin,
        &text_prompt(state.cfg.text_limits()),
        keyboards::cancel_creation(),
    )
    .await;
    None
}

async fn on_text(state: &AppState, owner: UserId, chat: ChatId, text: &str) {
    let limits = state.cfg.text_limits();
    let result = state
        .drafts
        .with(chat, |slot| {
            let collecting = slot.conversation.is_collecting();
            slot.conversation
                .submit_text(text, limits)
                .map_err(|e| (e, collecting))
        })
        .await;

    let to = Recipient::chat(chat);
    match result {
        None => show_menu(state, owner, chat, None).await,
        Some(Ok(())) => {
            show_service(
                state,
                chat,
                None,
                "📎 Attach photos, videos, documents or voice notes if needed, then press «Done».",
                keyboards::attachments_controls(),
            )
            .await
        }
        Some(Err((DraftError::WrongPhase, true))) => {
            say(state, to, "📎 Send files for the ticket or press «Done».").await
        }
        Some(Err((DraftError::WrongPhase, false))) => {
            say(state, to, "ℹ️ Use the buttons under the preview.").await
        }
        Some(Err((e, _))) => say(state, to, &format!("⚠️ The {e}. Please try again.")).await,
    }
}

async fn show_preview(
    state: &AppState,
    owner: UserId,
    chat: ChatId,
    origin: Option<MessageRef>,
    text: &str,
    attachments: usize,
) {
    let profile = match state.desk.requester(owner).await {
        Ok(p) => p,
        Err(e) => {
            warn!(user_id = owner.0, error = %e, "profile lookup failed");
            None
        }
    };
    show_service(
        state,
        chat,
        origin,
        &preview_text(text, attachments, profile.as_ref()),
        keyboards::preview_controls(),
    )
    .await;
}

/// Owner card for `ticket_id`; `false` when it is not the owner's ticket.
async fn show_card(
    state: &AppState,
    owner: UserId,
    origin: MessageRef,
    ticket_id: TicketId,
) -> hdb_core::Result<bool> {
    let Some((ticket, address)) = state.desk.owned_ticket(owner, ticket_id).await? else {
        return Ok(false);
    };
    let html = ticket_card(
        &ticket,
        address.as_deref(),
        state.desk.settings().utc_offset_hours,
    );
    present(
        state,
        origin.chat_id,
        Some(origin),
        &html,
        keyboards::ticket_detail(&ticket),
    )
    .await;
    Ok(true)
}

/// Inline-button actions in the private chat. The returned notice answers the callback.
pub async fn on_action(
    state: &AppState,
    owner: UserId,
    origin: MessageRef,
    action: TicketAction,
) -> Option<Notice> {
    let chat = origin.chat_id;
    match action {
        TicketAction::Menu => {
            show_menu(state, owner, chat, Some(origin)).await;
            None
        }
        TicketAction::Start => begin_draft(state, owner, chat, Some(origin)).await,
        TicketAction::AttachmentsDone => {
            let step = state
                .drafts
                .with(chat, |slot| {
                    let ack = slot.conversation.finish_attachments()?;
                    let (text, count) = slot.conversation.preview().unwrap_or_default();
                    Ok::<_, DraftError>((ack, text.to_string(), count))
                })
                .await;
            match step {
                None => Some(Notice::alert(DRAFT_EXPIRED)),
                Some(Err(_)) => Some(Notice::toast(STALE_BUTTON)),
                Some(Ok((ack, text, count))) => {
                    if let Some(ack) = ack {
                        say(state, Recipient::chat(chat), &attachments::ack_text(ack)).await;
                    }
                    show_preview(state, owner, chat, Some(origin), &text, count).await;
                    None
                }
            }
        }
        TicketAction::EditText => {
            match state
                .drafts
                .with(chat, |slot| slot.conversation.edit_text())
                .await
            {
                None => Some(Notice::alert(DRAFT_EXPIRED)),
                Some(Err(_)) => Some(Notice::toast(STALE_BUTTON)),
                Some(Ok(())) => {
                    show_service(
                        state,
                        chat,
                        Some(origin),
                        &text_prompt(state.cfg.text_limits()),
                        keyboards::cancel_creation(),
                    )
                    .await;
                    None
                }
            }
        }
        TicketAction::AddMore => {
            match state
                .drafts
                .with(chat, |slot| slot.conversation.add_more())
                .await
            {
                None => Some(Notice::alert(DRAFT_EXPIRED)),
                Some(Err(_)) => Some(Notice::toast(STALE_BUTTON)),
                Some(Ok(count)) => {
                    show_service(
                        state,
                        chat,
                        Some(origin),
                        &format!("📎 {count} attached. Send more files, then press «Done»."),
                        keyboards::attachments_controls(),
                    )
                    .await;
                    None
                }
            }
        }
        TicketAction::Confirm => {
            let Some(draft) = state.drafts.take_confirmed(chat).await else {
                return Some(Notice::alert(DRAFT_EXPIRED));
            };
            if let Err(e) = state
                .messenger
                .edit_keyboard(origin, InlineKeyboard::default())
                .await
            {
                debug!(chat_id = chat.0, error = %e, "preview keyboard removal failed");
            }
            if let Some(old) = draft.service_message.filter(|m| *m != origin) {
                drop_message(state, old).await;
            }
            let kept = ConfirmedDraft {
                service_message: Some(origin),
                ..draft.clone()
            };
            match state.desk.submit(owner, draft).await {
                Ok(sub) => Some(Notice::toast(format!("✅ Ticket #{} submitted.", sub.ticket.id))),
                Err(e) => {
                    warn!(user_id = owner.0, error = %e, "ticket submission failed; draft kept");
                    let (text, count) = (kept.text.clone(), kept.attachments.len());
                    state.drafts.restore(chat, kept).await;
                    show_preview(state, owner, chat, Some(origin), &text, count).await;
                    Some(Notice::alert(SUBMIT_FAILED))
                }
            }
        }
        TicketAction::Abort => {
            if let Some(slot) = state.drafts.discard(chat).await {
                if let Some(old) = slot.service_message.filter(|m| *m != origin) {
                    drop_message(state, old).await;
                }
            }
            present(
                state,
                chat,
                Some(origin),
                "❌ Ticket creation cancelled.",
                keyboards::ticket_menu(state.desk.active_ticket(owner).await.ok().flatten()),
            )
            .await;
            None
        }
        TicketAction::Cancel(ticket_id) => match state.desk.cancel_by_owner(owner, ticket_id).await {
            Ok(CancelOutcome::Cancelled { .. }) => {
                if let Err(e) = show_card(state, owner, origin, ticket_id).await {
                    warn!(ticket_id = ticket_id.0, error = %e, "card refresh failed");
                }
                Some(Notice::toast(format!("🚫 Ticket #{ticket_id} cancelled.")))
            }
            Ok(CancelOutcome::Refused) => {
                Some(Notice::alert("This ticket can no longer be cancelled."))
            }
            Err(e) => {
                warn!(ticket_id = ticket_id.0, error = %e, "owner cancel failed");
                Some(Notice::alert(GENERIC_FAILURE))
            }
        },
        TicketAction::Show(ticket_id) => match show_card(state, owner, origin, ticket_id).await {
            Ok(true) => None,
            Ok(false) => Some(Notice::alert("Ticket not found.")),
            Err(e) => {
                warn!(ticket_id = ticket_id.0, error = %e, "ticket card failed");
                Some(Notice::alert(GENERIC_FAILURE))
            }
        },
        TicketAction::HistoryFilters => {
            show_filters(state, owner, chat, Some(origin)).await;
            None
        }
        TicketAction::History { status, page } => {
            match state.desk.history(owner, status, page).await {
                Ok(listing) => {
                    present(
                        state,
                        chat,
                        Some(origin),
                        &history_header(&listing, status),
                        keyboards::history_list(
                            &listing,
                            status,
                            state.desk.settings().utc_offset_hours,
                        ),
                    )
                    .await;
                    None
                }
                Err(e) => {
                    warn!(user_id = owner.0, error = %e, "history listing failed");
                    Some(Notice::alert(GENERIC_FAILURE))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::fixture;
    use super::*;

    #[test]
    fn prompt_mentions_limits() {
        let p = text_prompt(TextLimits {
            min_len: 5,
            max_len: 500,
        });
        assert!(p.contains("5-500"));
    }

    #[tokio::test]
    async fn failed_submit_keeps_the_draft_in_preview() {
        let f = fixture().await;
        // Unregistered sender: the store refuses to create the ticket.
        let owner = UserId(77);
        let chat = owner.private_chat();
        f.state.drafts.start(chat).await;
        f.state
            .drafts
            .with(chat, |s| {
                s.conversation.submit_text("Lift is stuck", f.state.cfg.text_limits())?;
                s.conversation.finish_attachments()
            })
            .await
            .unwrap()
            .unwrap();
        let origin = MessageRef {
            chat_id: chat,
            message_id: MessageId(9),
        };

        let notice = on_action(&f.state, owner, origin, TicketAction::Confirm).await;
        assert_eq!(notice, Some(Notice::alert(SUBMIT_FAILED)));
        assert_eq!(f.state.drafts.phase(chat).await, Some("preview"));
        let kept = f.state.drafts.take_confirmed(chat).await.unwrap();
        assert_eq!(kept.text, "Lift is stuck");
    }
}
