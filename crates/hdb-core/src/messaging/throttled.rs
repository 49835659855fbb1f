use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef, Recipient, TopicRef},
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities, OutboundMedia},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two outbound calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls into the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return how long to wait before using it.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that spaces outbound calls.
///
/// Staff fan-out and album relays produce short bursts into a handful of chats;
/// spacing them keeps the bot under Telegram's flood limits most of the time.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, chat_id: ChatId) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat_id.0).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, to: Recipient, html: &str) -> Result<MessageRef> {
        self.throttle_chat(to.chat_id).await;
        self.inner.send_html(to, html).await
    }

    async fn send_keyboard(
        &self,
        to: Recipient,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.throttle_chat(to.chat_id).await;
        self.inner.send_keyboard(to, html, keyboard).await
    }

    async fn edit_html(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        self.throttle_chat(msg.chat_id).await;
        self.inner.edit_html(msg, html, keyboard).await
    }

    async fn edit_keyboard(&self, msg: MessageRef, keyboard: InlineKeyboard) -> Result<()> {
        self.throttle_chat(msg.chat_id).await;
        self.inner.edit_keyboard(msg, keyboard).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.throttle_chat(msg.chat_id).await;
        self.inner.delete_message(msg).await
    }

    async fn copy_message(&self, to: Recipient, from: MessageRef) -> Result<MessageRef> {
        self.throttle_chat(to.chat_id).await;
        self.inner.copy_message(to, from).await
    }

    async fn send_media(&self, to: Recipient, media: &OutboundMedia) -> Result<MessageRef> {
        self.throttle_chat(to.chat_id).await;
        self.inner.send_media(to, media).await
    }

    async fn create_topic(&self, chat_id: ChatId, name: &str) -> Result<TopicRef> {
        self.throttle_chat(chat_id).await;
        self.inner.create_topic(chat_id, name).await
    }

    async fn rename_topic(&self, topic: TopicRef, name: &str) -> Result<()> {
        self.throttle_chat(topic.chat_id).await;
        self.inner.rename_topic(topic, name).await
    }

    async fn close_topic(&self, topic: TopicRef) -> Result<()> {
        self.throttle_chat(topic.chat_id).await;
        self.inner.close_topic(topic).await
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()> {
        // No chat here; global spacing only.
        self.throttle_global().await;
        self.inner
            .answer_callback_query(callback_id, text, show_alert)
            .await
    }
}
