//! Attachment collection for ticket drafts.
//!
//! Albums arrive as separate updates. Each album update schedules a finalize
//! after the quiet period; only the newest scheduled finalize does anything.

use std::sync::Arc;

use teloxide::types::Message;
use tracing::debug;

use hdb_core::{
    album::{Ack, FinalizeTicket},
    domain::{ChatId, MessageId, Recipient, UserId},
    drafts::{Conversation, DraftError},
    keyboards,
    ticket::{DraftAttachment, MediaKind},
};

use crate::router::AppState;

use super::{
    say,
    ticket::{show_menu, show_service},
};

const NO_DRAFT: &str = "📎 Files are attached to a ticket draft. Start a new ticket from the menu first.";

/// The single attachment carried by a message, if any.
pub fn extract(msg: &Message) -> Option<DraftAttachment> {
    let caption = msg.caption().map(str::to_string);
    let (kind, file) = if let Some(sizes) = msg.photo() {
        // Sizes are ascending; the last one is the original.
        (MediaKind::Photo, &sizes.last()?.file)
    } else if let Some(v) = msg.video() {
        (MediaKind::Video, &v.file)
    } else if let Some(d) = msg.document() {
        (MediaKind::Document, &d.file)
    } else if let Some(a) = msg.audio() {
        (MediaKind::Audio, &a.file)
    } else if let Some(v) = msg.voice() {
        (MediaKind::Voice, &v.file)
    } else {
        return None;
    };
    Some(DraftAttachment {
        kind,
        file_id: file.id.clone(),
        file_unique_id: Some(file.unique_id.clone()),
        caption,
    })
}

pub fn ack_text(ack: Ack) -> String {
    match ack {
        Ack::Single { total } => {
            format!("📎 File received ({total} attached). Send more or press «Done».")
        }
        Ack::AlbumComplete { count, total } => format!(
            "📎 Album received: {count} files ({total} attached). Send more or press «Done»."
        ),
    }
}

pub async fn on_attachment(
    state: &Arc<AppState>,
    owner: UserId,
    chat: ChatId,
    message_id: MessageId,
    attachment: DraftAttachment,
    group_id: Option<&str>,
) {
    let step = state
        .drafts
        .with(chat, |slot| {
            let waiting_for_text = matches!(slot.conversation, Conversation::AwaitingText);
            slot.conversation
                .add_attachment(message_id, attachment, group_id)
                .map_err(|e| (e, waiting_for_text))
        })
        .await;

    let step = match step {
        None => {
            debug!(chat_id = chat.0, "attachment outside a draft");
            say(state, Recipient::chat(chat), NO_DRAFT).await;
            show_menu(state, owner, chat, None).await;
            return;
        }
        Some(Err((DraftError::WrongPhase, true))) => {
            say(
                state,
                Recipient::chat(chat),
                "✍️ Please describe the problem in a text message first.",
            )
            .await;
            return;
        }
        Some(Err(_)) => {
            say(
                state,
                Recipient::chat(chat),
                "ℹ️ Use the buttons under the preview to add more files.",
            )
            .await;
            return;
        }
        Some(Ok(step)) => step,
    };

    for ack in step.acks {
        send_ack(state, chat, ack).await;
    }
    if let Some(ticket) = step.schedule {
        spawn_finalize(Arc::clone(state), chat, ticket);
    }
}

async fn send_ack(state: &AppState, chat: ChatId, ack: Ack) {
    show_service(
        state,
        chat,
        None,
        &ack_text(ack),
        keyboards::attachments_controls(),
    )
    .await;
}

fn spawn_finalize(state: Arc<AppState>, chat: ChatId, ticket: FinalizeTicket) {
    let quiet = state.cfg.album_quiet_period;
    tokio::spawn(async move {
        let sent = state
            .drafts
            .finalize_after_quiet(
                chat,
                ticket,
                quiet,
                state.chat_locks.lock_chat(chat.0),
                |ack| send_ack(&state, chat, ack),
            )
            .await;
        if sent.is_none() {
            debug!(chat_id = chat.0, generation = ticket.generation, "album finalize superseded");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(json: serde_json::Value) -> Message {
        serde_json::from_value(json).unwrap()
    }

    fn base() -> serde_json::Value {
        serde_json::json!({
            "message_id": 5,
            "date": 1_700_000_000,
            "chat": { "id": 42, "type": "private", "first_name": "Olga" },
            "from": { "id": 42, "is_bot": false, "first_name": "Olga" },
        })
    }

    #[test]
    fn photo_takes_largest_size_and_caption() {
        let mut json = base();
        json["photo"] = serde_json::json!([
            { "file_id": "small", "file_unique_id": "us", "width": 90, "height": 90 },
            { "file_id": "large", "file_unique_id": "ul", "width": 1280, "height": 1280 }
        ]);
        json["caption"] = serde_json::json!("kitchen");
        let a = extract(&message(json)).unwrap();
        assert_eq!(a.kind, MediaKind::Photo);
        assert_eq!(a.file_id, "large");
        assert_eq!(a.file_unique_id.as_deref(), Some("ul"));
        assert_eq!(a.caption.as_deref(), Some("kitchen"));
    }

    #[test]
    fn voice_and_plain_text() {
        let mut json = base();
        json["voice"] = serde_json::json!({ "file_id": "v1", "file_unique_id": "uv", "duration": 3, "mime_type": "audio/ogg" });
        let a = extract(&message(json)).unwrap();
        assert_eq!(a.kind, MediaKind::Voice);

        let mut json = base();
        json["text"] = serde_json::json!("hello");
        assert!(extract(&message(json)).is_none());
    }

    #[test]
    fn ack_wording() {
        assert!(ack_text(Ack::Single { total: 1 }).contains("1 attached"));
        assert!(ack_text(Ack::AlbumComplete { count: 5, total: 6 }).starts_with("📎 Album received: 5 files"));
    }
}
