//! Test doubles for the messaging port.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicI32, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef, Recipient, ThreadId, TopicRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities, OutboundMedia},
    },
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    SendHtml {
        to: Recipient,
        html: String,
    },
    SendKeyboard {
        to: Recipient,
        html: String,
        keyboard: InlineKeyboard,
    },
    EditHtml {
        msg: MessageRef,
        html: String,
    },
    EditKeyboard {
        msg: MessageRef,
        keyboard: InlineKeyboard,
    },
    Delete(MessageRef),
    Copy {
        to: Recipient,
        from: MessageRef,
    },
    SendMedia {
        to: Recipient,
        media: OutboundMedia,
    },
    CreateTopic {
        chat_id: ChatId,
        name: String,
    },
    RenameTopic {
        topic: TopicRef,
        name: String,
    },
    CloseTopic(TopicRef),
    AnswerCallback {
        text: Option<String>,
        alert: bool,
    },
}

/// Switches for simulated transport failures. Failing calls are still recorded.
#[derive(Debug, Default)]
pub struct Failures {
    pub rename: bool,
    pub close: bool,
    pub create_topic: bool,
    pub send_media: bool,
    /// Chats whose sends (text, keyboard, copy) fail.
    pub send_to: HashSet<i64>,
}

pub struct RecordingMessenger {
    calls: Mutex<Vec<Call>>,
    pub failures: Mutex<Failures>,
    next_message_id: AtomicI32,
    next_thread_id: AtomicI32,
}

impl Default for RecordingMessenger {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Failures::default()),
            next_message_id: AtomicI32::new(100),
            next_thread_id: AtomicI32::new(500),
        }
    }
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, f: impl FnOnce(&mut Failures)) {
        f(&mut self.failures.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Text of every message (plain or with keyboard) sent to `to`.
    pub fn texts_to(&self, to: Recipient) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendHtml { to: t, html } | Call::SendKeyboard { to: t, html, .. }
                    if t == to =>
                {
                    Some(html)
                }
                _ => None,
            })
            .collect()
    }

    pub fn renames(&self) -> Vec<(TopicRef, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::RenameTopic { topic, name } => Some((topic, name)),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> Vec<TopicRef> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CloseTopic(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn media_to(&self, to: Recipient) -> Vec<OutboundMedia> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendMedia { to: t, media } if t == to => Some(media),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, failing: impl FnOnce(&Failures) -> bool, what: &str) -> Result<()> {
        if failing(&self.failures.lock().unwrap()) {
            return Err(Error::External(format!("simulated {what} failure")));
        }
        Ok(())
    }

    fn next_ref(&self, chat_id: ChatId) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst)),
        }
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_html: true,
            supports_edit: true,
            supports_forum_topics: true,
            supports_inline_keyboards: true,
            max_message_len: 4096,
            max_callback_data_len: 64,
        }
    }

    async fn send_html(&self, to: Recipient, html: &str) -> Result<MessageRef> {
        self.record(Call::SendHtml {
            to,
            html: html.to_string(),
        });
        self.check(|f| f.send_to.contains(&to.chat_id.0), "send")?;
        Ok(self.next_ref(to.chat_id))
    }

    async fn send_keyboard(
        &self,
        to: Recipient,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.record(Call::SendKeyboard {
            to,
            html: html.to_string(),
            keyboard,
        });
        self.check(|f| f.send_to.contains(&to.chat_id.0), "send")?;
        Ok(self.next_ref(to.chat_id))
    }

    async fn edit_html(
        &self,
        msg: MessageRef,
        html: &str,
        _keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        self.record(Call::EditHtml {
            msg,
            html: html.to_string(),
        });
        Ok(())
    }

    async fn edit_keyboard(&self, msg: MessageRef, keyboard: InlineKeyboard) -> Result<()> {
        self.record(Call::EditKeyboard { msg, keyboard });
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.record(Call::Delete(msg));
        Ok(())
    }

    async fn copy_message(&self, to: Recipient, from: MessageRef) -> Result<MessageRef> {
        self.record(Call::Copy { to, from });
        self.check(|f| f.send_to.contains(&to.chat_id.0), "copy")?;
        Ok(self.next_ref(to.chat_id))
    }

    async fn send_media(&self, to: Recipient, media: &OutboundMedia) -> Result<MessageRef> {
        self.record(Call::SendMedia {
            to,
            media: media.clone(),
        });
        self.check(|f| f.send_media, "media")?;
        Ok(self.next_ref(to.chat_id))
    }

    async fn create_topic(&self, chat_id: ChatId, name: &str) -> Result<TopicRef> {
        self.record(Call::CreateTopic {
            chat_id,
            name: name.to_string(),
        });
        self.check(|f| f.create_topic, "create topic")?;
        Ok(TopicRef {
            chat_id,
            thread_id: ThreadId(self.next_thread_id.fetch_add(1, Ordering::SeqCst)),
        })
    }

    async fn rename_topic(&self, topic: TopicRef, name: &str) -> Result<()> {
        self.record(Call::RenameTopic {
            topic,
            name: name.to_string(),
        });
        self.check(|f| f.rename, "rename")
    }

    async fn close_topic(&self, topic: TopicRef) -> Result<()> {
        self.record(Call::CloseTopic(topic));
        self.check(|f| f.close, "close")
    }

    async fn answer_callback_query(
        &self,
        _callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()> {
        self.record(Call::AnswerCallback {
            text: text.map(str::to_string),
            alert: show_alert,
        });
        Ok(())
    }
}
