use crate::ticket::{Attachment, DraftAttachment, MediaKind};

/// Inline keyboard, row by row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Convenience for "one button per row" layouts.
    pub fn one_per_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        if !buttons.is_empty() {
            self.rows.push(buttons);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

/// A previously uploaded file re-sent by reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMedia {
    pub kind: MediaKind,
    pub file_id: String,
    pub caption: Option<String>,
}

impl OutboundMedia {
    /// Caption to send, dropped for kinds that cannot carry one.
    pub fn effective_caption(&self) -> Option<&str> {
        if !self.kind.supports_caption() {
            return None;
        }
        self.caption.as_deref().filter(|c| !c.trim().is_empty())
    }
}

impl From<&DraftAttachment> for OutboundMedia {
    fn from(a: &DraftAttachment) -> Self {
        Self {
            kind: a.kind,
            file_id: a.file_id.clone(),
            caption: a.caption.clone(),
        }
    }
}

impl From<&Attachment> for OutboundMedia {
    fn from(a: &Attachment) -> Self {
        Self {
            kind: a.kind,
            file_id: a.file_id.clone(),
            caption: a.caption.clone(),
        }
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_html: bool,
    pub supports_edit: bool,
    pub supports_forum_topics: bool,
    pub supports_inline_keyboards: bool,
    pub max_message_len: usize,
    pub max_callback_data_len: usize,
}
