use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{Message, MessageKind},
};
use tracing::{debug, warn};

use hdb_core::{
    commands::{parse_command, TopicCommand},
    desk::{Denial, RelayOutcome, StatusOutcome, StatusRequest},
    domain::{ChatId, Recipient, TopicRef, UserId},
    ticket::StatusSource,
};

use crate::router::AppState;

use super::{message_ref, say, sender, topic_thread, GENERIC_FAILURE};

/// Staff activity in the notification channel: topic commands or relay.
pub async fn handle_channel_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    // Service messages (topic created/closed, pins, ...) carry nothing to act on.
    if !matches!(msg.kind, MessageKind::Common(_)) {
        return Ok(());
    }
    if msg.from().is_some_and(|u| u.is_bot) {
        return Ok(());
    }
    let Some(actor) = sender(&msg) else {
        return Ok(());
    };

    let chat = ChatId(msg.chat.id.0);
    let thread = topic_thread(&msg);
    let reply_to = match thread {
        Some(thread_id) => Recipient::from(TopicRef {
            chat_id: chat,
            thread_id,
        }),
        None => Recipient::chat(chat),
    };

    if let Some(text) = msg.text() {
        if let Some(cmd) = TopicCommand::parse(text) {
            run_topic_command(&state, cmd, actor, chat, reply_to).await;
            return Ok(());
        }
        // Other commands are not conversation and are never relayed.
        if parse_command(text).is_some() {
            return Ok(());
        }
    }

    match state
        .desk
        .relay_staff_message(actor, chat, thread, message_ref(&msg))
        .await
    {
        Ok(outcome @ RelayOutcome::Failed { .. }) => {
            warn!(?outcome, "staff message not delivered to owner");
        }
        Ok(outcome) => debug!(?outcome, "staff message handled"),
        Err(e) => warn!(chat_id = chat.0, error = %e, "relay lookup failed"),
    }
    Ok(())
}

async fn run_topic_command(
    state: &AppState,
    cmd: TopicCommand,
    actor: UserId,
    chat: ChatId,
    reply_to: Recipient,
) {
    match cmd {
        TopicCommand::Panel => match state.desk.post_panel(actor, chat, reply_to.thread_id).await {
            Ok(Ok(_)) => {}
            Ok(Err(Denial::AccessDenied)) => {
                debug!(user_id = actor.0, "panel request from non-staff ignored");
            }
            Ok(Err(denial)) => say(state, reply_to, &denial.notice().text).await,
            Err(e) => {
                warn!(chat_id = chat.0, error = %e, "panel failed");
                say(state, reply_to, GENERIC_FAILURE).await;
            }
        },
        TopicCommand::SetStatus(target) => {
            let req = StatusRequest {
                source: StatusSource::TopicCommand,
                actor,
                chat,
                thread: reply_to.thread_id,
                ticket_id: None,
                target,
                panel: None,
            };
            match state.desk.change_status(req).await {
                Ok(outcome) => match command_reply(&outcome) {
                    Some(text) => say(state, reply_to, &text).await,
                    None => debug!(user_id = actor.0, ?outcome, "status command needs no reply"),
                },
                Err(e) => {
                    warn!(chat_id = chat.0, error = %e, "status command failed");
                    say(state, reply_to, GENERIC_FAILURE).await;
                }
            }
        }
    }
}

/// Reply for a topic status command. The in-topic announcement confirms a
/// change, and non-staff commands get no reply in the shared topic.
fn command_reply(outcome: &StatusOutcome) -> Option<String> {
    match outcome {
        StatusOutcome::Changed { .. } | StatusOutcome::Denied(Denial::AccessDenied) => None,
        other => Some(other.notice().text),
    }
}
