use std::fmt;

/// Telegram user id (numeric). Doubles as the user's private chat id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl UserId {
    pub fn private_chat(self) -> ChatId {
        ChatId(self.0)
    }
}

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// Forum topic thread id inside a supergroup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Store-assigned ticket id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketId(pub i64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Forum binding of a ticket: the topic that mirrors it in the staff group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TopicRef {
    pub chat_id: ChatId,
    pub thread_id: ThreadId,
}

/// Where an outgoing message goes: a plain chat or a topic inside a forum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Recipient {
    pub chat_id: ChatId,
    pub thread_id: Option<ThreadId>,
}

impl Recipient {
    pub fn chat(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            thread_id: None,
        }
    }

    pub fn user(user_id: UserId) -> Self {
        Self::chat(user_id.private_chat())
    }
}

impl From<TopicRef> for Recipient {
    fn from(t: TopicRef) -> Self {
        Self {
            chat_id: t.chat_id,
            thread_id: Some(t.thread_id),
        }
    }
}

impl From<ChatId> for Recipient {
    fn from(c: ChatId) -> Self {
        Self::chat(c)
    }
}
