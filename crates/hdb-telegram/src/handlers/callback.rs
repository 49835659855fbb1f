use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};
use tracing::warn;

use hdb_core::{
    commands::CallbackCommand,
    desk::{Notice, StatusRequest},
    domain::{ChatId, MessageId, MessageRef, UserId},
    ticket::StatusSource,
};

use crate::router::AppState;

use super::{ticket, topic_thread, GENERIC_FAILURE};

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let actor = UserId(q.from.id.0 as i64);

    let (Some(msg), Some(cmd)) = (
        q.message.as_ref(),
        q.data.as_deref().and_then(CallbackCommand::parse),
    ) else {
        answer(&state, &cb_id, Some(Notice::toast("This button is no longer active."))).await;
        return Ok(());
    };
    let origin = MessageRef {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
    };

    let notice = match cmd {
        CallbackCommand::SetStatus { ticket_id, target } => {
            let req = StatusRequest {
                source: StatusSource::Panel,
                actor,
                chat: origin.chat_id,
                thread: topic_thread(msg),
                ticket_id: Some(ticket_id),
                target,
                panel: Some(origin),
            };
            match state.desk.change_status(req).await {
                Ok(outcome) => Some(outcome.notice()),
                Err(e) => {
                    warn!(ticket_id = ticket_id.0, error = %e, "panel status change failed");
                    Some(Notice::alert(GENERIC_FAILURE))
                }
            }
        }
        CallbackCommand::Ticket(action) => {
            if !msg.chat.is_private() {
                None
            } else {
                let _guard = state.chat_locks.lock_chat(origin.chat_id.0).await;
                ticket::on_action(&state, actor, origin, action).await
            }
        }
    };

    answer(&state, &cb_id, notice).await;
    Ok(())
}

/// Always answer so the client stops its spinner.
async fn answer(state: &AppState, cb_id: &str, notice: Option<Notice>) {
    let (text, alert) = match &notice {
        Some(n) => (Some(n.text.as_str()), n.alert),
        None => (None, false),
    };
    if let Err(e) = state
        .messenger
        .answer_callback_query(cb_id, text, alert)
        .await
    {
        warn!(error = %e, "answer callback failed");
    }
}
