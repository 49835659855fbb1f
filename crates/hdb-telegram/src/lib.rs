//! Telegram adapter (teloxide).
//!
//! This crate implements the `hdb-core` MessagingPort over Telegram Bot API and
//! routes updates into the ticket desk.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use hdb_core::{
    domain::{ChatId, MessageId, MessageRef, Recipient, ThreadId, TopicRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities, OutboundMedia},
    },
    ticket::MediaKind,
    Result,
};

/// Default forum topic icon colour (light blue).
const TOPIC_ICON_COLOR: u32 = 0x6FB9F0;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|b| InlineKeyboardButton::callback(b.label, b.callback_data))
                    .collect()
            })
            .collect();
        InlineKeyboardMarkup::new(rows)
    }

    fn sent(to: Recipient, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id: to.chat_id,
            message_id: MessageId(msg.id.0),
        }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
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
        let msg = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .send_message(Self::tg_chat(to.chat_id), html.to_string())
                    .parse_mode(ParseMode::Html);
                if let Some(t) = to.thread_id {
                    req = req.message_thread_id(t.0);
                }
                req
            })
            .await?;
        Ok(Self::sent(to, &msg))
    }

    async fn send_keyboard(
        &self,
        to: Recipient,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = Self::markup(keyboard);
        let msg = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .send_message(Self::tg_chat(to.chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone());
                if let Some(t) = to.thread_id {
                    req = req.message_thread_id(t.0);
                }
                req
            })
            .await?;
        Ok(Self::sent(to, &msg))
    }

    async fn edit_html(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        let markup = keyboard.map(Self::markup);
        self.with_retry(|| {
            let mut req = self
                .bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html);
            if let Some(m) = &markup {
                req = req.reply_markup(m.clone());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn edit_keyboard(&self, msg: MessageRef, keyboard: InlineKeyboard) -> Result<()> {
        let markup = Self::markup(keyboard);
        self.with_retry(|| {
            self.bot
                .edit_message_reply_markup(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                )
                .reply_markup(markup.clone())
        })
        .await?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn copy_message(&self, to: Recipient, from: MessageRef) -> Result<MessageRef> {
        let id = self
            .with_retry(|| {
                let mut req = self.bot.copy_message(
                    Self::tg_chat(to.chat_id),
                    Self::tg_chat(from.chat_id),
                    Self::tg_msg_id(from.message_id),
                );
                if let Some(t) = to.thread_id {
                    req = req.message_thread_id(t.0);
                }
                req
            })
            .await?;
        Ok(MessageRef {
            chat_id: to.chat_id,
            message_id: MessageId(id.0),
        })
    }

    async fn send_media(&self, to: Recipient, media: &OutboundMedia) -> Result<MessageRef> {
        let chat = Self::tg_chat(to.chat_id);
        let thread = to.thread_id.map(|t| t.0);
        let caption = media.effective_caption().map(str::to_string);
        let file = || InputFile::file_id(media.file_id.clone());

        // Each kind has its own request type, so the thread/caption plumbing repeats.
        let msg = match media.kind {
            MediaKind::Photo => {
                self.with_retry(|| {
                    let mut req = self.bot.send_photo(chat, file());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(t) = thread {
                        req = req.message_thread_id(t);
                    }
                    req
                })
                .await?
            }
            MediaKind::Video => {
                self.with_retry(|| {
                    let mut req = self.bot.send_video(chat, file());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(t) = thread {
                        req = req.message_thread_id(t);
                    }
                    req
                })
                .await?
            }
            MediaKind::Document => {
                self.with_retry(|| {
                    let mut req = self.bot.send_document(chat, file());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(t) = thread {
                        req = req.message_thread_id(t);
                    }
                    req
                })
                .await?
            }
            MediaKind::Audio => {
                self.with_retry(|| {
                    let mut req = self.bot.send_audio(chat, file());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(t) = thread {
                        req = req.message_thread_id(t);
                    }
                    req
                })
                .await?
            }
            MediaKind::Voice => {
                self.with_retry(|| {
                    let mut req = self.bot.send_voice(chat, file());
                    if let Some(t) = thread {
                        req = req.message_thread_id(t);
                    }
                    req
                })
                .await?
            }
        };
        Ok(Self::sent(to, &msg))
    }

    async fn create_topic(&self, chat_id: ChatId, name: &str) -> Result<TopicRef> {
        let topic = self
            .with_retry(|| {
                self.bot.create_forum_topic(
                    Self::tg_chat(chat_id),
                    name.to_string(),
                    TOPIC_ICON_COLOR,
                    String::new(),
                )
            })
            .await?;
        Ok(TopicRef {
            chat_id,
            thread_id: ThreadId(topic.message_thread_id),
        })
    }

    async fn rename_topic(&self, topic: TopicRef, name: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .edit_forum_topic(Self::tg_chat(topic.chat_id), topic.thread_id.0)
                .name(name.to_string())
        })
        .await?;
        Ok(())
    }

    async fn close_topic(&self, topic: TopicRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .close_forum_topic(Self::tg_chat(topic.chat_id), topic.thread_id.0)
        })
        .await?;
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            if show_alert {
                req = req.show_alert(true);
            }
            req
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdb_core::messaging::types::InlineButton;

    #[test]
    fn keyboard_rows_are_kept() {
        let kb = InlineKeyboard::default()
            .row(vec![
                InlineButton::new("a", "tk:start"),
                InlineButton::new("b", "tk:abort"),
            ])
            .row(vec![InlineButton::new("c", "tk:menu")]);
        let markup = TelegramMessenger::markup(kb);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "c");
    }
}
