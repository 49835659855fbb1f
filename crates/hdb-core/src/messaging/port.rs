use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, Recipient, TopicRef},
    messaging::types::{InlineKeyboard, MessagingCapabilities, OutboundMedia},
    Result,
};

/// Outbound messaging port.
///
/// Every call may fail with a transient delivery error (`Error::External`).
/// Callers mirroring already-committed state log such failures and move on.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, to: Recipient, html: &str) -> Result<MessageRef>;

    async fn send_keyboard(
        &self,
        to: Recipient,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    /// Replace text (and optionally the keyboard) of a sent message.
    async fn edit_html(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()>;

    async fn edit_keyboard(&self, msg: MessageRef, keyboard: InlineKeyboard) -> Result<()>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    /// Copy an existing message (any content type) without a "forwarded from" header.
    async fn copy_message(&self, to: Recipient, from: MessageRef) -> Result<MessageRef>;

    async fn send_media(&self, to: Recipient, media: &OutboundMedia) -> Result<MessageRef>;

    async fn create_topic(&self, chat_id: ChatId, name: &str) -> Result<TopicRef>;
    async fn rename_topic(&self, topic: TopicRef, name: &str) -> Result<()>;
    async fn close_topic(&self, topic: TopicRef) -> Result<()>;

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()>;
}
