//! Telegram update handlers.
//!
//! Messages from the notification channel go to the forum handler (staff
//! commands and relay); private chats drive the resident ticket flow. All
//! outbound traffic goes through the throttled `MessagingPort`.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};
use tracing::warn;

use hdb_core::domain::{ChatId, MessageId, MessageRef, Recipient, ThreadId, UserId};

use crate::router::AppState;

mod attachments;
mod callback;
mod forum;
mod ticket;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);

    if chat_id == state.cfg.notification_channel_id {
        return forum::handle_channel_message(msg, state).await;
    }
    if !msg.chat.is_private() {
        return Ok(());
    }

    // Sequentialize per chat so draft phases see updates in order.
    let _guard = state.chat_locks.lock_chat(chat_id.0).await;
    ticket::handle_private_message(msg, state).await
}

fn sender(msg: &Message) -> Option<UserId> {
    msg.from().map(|u| UserId(u.id.0 as i64))
}

fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
    }
}

/// Forum topic of the message, if it was posted inside one.
fn topic_thread(msg: &Message) -> Option<ThreadId> {
    if matches!(&msg.kind, teloxide::types::MessageKind::Common(c) if c.is_topic_message) {
        msg.thread_id.map(ThreadId)
    } else {
        None
    }
}

/// Best-effort reply; failures are logged.
async fn say(state: &AppState, to: Recipient, html: &str) {
    if let Err(e) = state.messenger.send_html(to, html).await {
        warn!(chat_id = to.chat_id.0, error = %e, "reply failed");
    }
}

const GENERIC_FAILURE: &str = "⚠️ Something went wrong. Please try again later.";


#[cfg(test)]
mod tests {
    use hdb_core::testing::Call;

    use super::fixtures::*;
    use super::*;

    #[tokio::test]
    async fn topic_command_from_non_staff_gets_no_reply() {
        let f = fixture().await;
        handle_message(in_topic(RESIDENT, 500, "/work"), f.state.clone())
            .await
            .unwrap();
        handle_message(in_topic(RESIDENT, 500, "/panel"), f.state.clone())
            .await
            .unwrap();
        assert!(f.messenger.calls().is_empty());
    }

    #[tokio::test]
    async fn topic_command_from_staff_without_ticket_is_answered() {
        let f = fixture().await;
        handle_message(in_topic(STAFF, 500, "/work"), f.state.clone())
            .await
            .unwrap();
        let topic = Recipient::from(hdb_core::domain::TopicRef {
            chat_id: CHANNEL,
            thread_id: ThreadId(500),
        });
        assert_eq!(
            f.messenger.texts_to(topic),
            vec!["⚠️ No ticket found for this topic.".to_string()]
        );
    }

    #[tokio::test]
    async fn file_outside_a_draft_gets_a_hint_and_the_menu() {
        let f = fixture().await;
        let photo = private(
            RESIDENT,
            serde_json::json!({
                "photo": [{ "file_id": "p1", "file_unique_id": "u1", "width": 90, "height": 90 }]
            }),
        );
        handle_message(photo, f.state.clone()).await.unwrap();

        let calls = f.messenger.calls();
        assert!(matches!(
            calls.as_slice(),
            [Call::SendHtml { html, .. }, Call::SendKeyboard { .. }] if html.contains("ticket draft")
        ));
    }
}
