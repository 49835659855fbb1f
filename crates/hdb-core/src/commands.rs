//! Typed commands parsed once at the transport boundary.
//!
//! Callback payloads are short ASCII strings (Telegram caps them at 64 bytes):
//!
//! - `tset:{id}:{open|work|done}` status panel buttons
//! - `tk:menu`, `tk:start`, `tk:done`, `tk:confirm`, `tk:abort`, `tk:edit`, `tk:more`
//! - `tk:cancel:{id}`, `tk:show:{id}`, `tk:filters`, `tk:hist:{open|work|done}:{page}`

use crate::{domain::TicketId, ticket::TicketStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackCommand {
    SetStatus {
        ticket_id: TicketId,
        target: TicketStatus,
    },
    Ticket(TicketAction),
}

/// Resident-side ticket flow actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TicketAction {
    Menu,
    Start,
    AttachmentsDone,
    Confirm,
    Abort,
    EditText,
    AddMore,
    Cancel(TicketId),
    Show(TicketId),
    HistoryFilters,
    History { status: TicketStatus, page: u32 },
}

impl CallbackCommand {
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.split(':');
        let cmd = match (parts.next()?, parts.next(), parts.next(), parts.next()) {
            ("tset", Some(id), Some(word), None) => Self::SetStatus {
                ticket_id: parse_ticket_id(id)?,
                target: TicketStatus::from_command_word(word)?,
            },
            ("tk", Some(action), a, b) => Self::Ticket(parse_ticket_action(action, a, b)?),
            _ => return None,
        };
        // Reject trailing segments.
        parts.next().is_none().then_some(cmd)
    }

    pub fn encode(&self) -> String {
        match self {
            Self::SetStatus { ticket_id, target } => {
                format!("tset:{}:{}", ticket_id.0, target.command_word())
            }
            Self::Ticket(action) => match action {
                TicketAction::Menu => "tk:menu".to_string(),
                TicketAction::Start => "tk:start".to_string(),
                TicketAction::AttachmentsDone => "tk:done".to_string(),
                TicketAction::Confirm => "tk:confirm".to_string(),
                TicketAction::Abort => "tk:abort".to_string(),
                TicketAction::EditText => "tk:edit".to_string(),
                TicketAction::AddMore => "tk:more".to_string(),
                TicketAction::Cancel(id) => format!("tk:cancel:{}", id.0),
                TicketAction::Show(id) => format!("tk:show:{}", id.0),
                TicketAction::HistoryFilters => "tk:filters".to_string(),
                TicketAction::History { status, page } => {
                    format!("tk:hist:{}:{page}", status.command_word())
                }
            },
        }
    }
}

fn parse_ticket_id(s: &str) -> Option<TicketId> {
    s.parse::<i64>().ok().filter(|id| *id > 0).map(TicketId)
}

fn parse_ticket_action(action: &str, a: Option<&str>, b: Option<&str>) -> Option<TicketAction> {
    let action = match (action, a, b) {
        ("menu", None, None) => TicketAction::Menu,
        ("start", None, None) => TicketAction::Start,
        ("done", None, None) => TicketAction::AttachmentsDone,
        ("confirm", None, None) => TicketAction::Confirm,
        ("abort", None, None) => TicketAction::Abort,
        ("edit", None, None) => TicketAction::EditText,
        ("more", None, None) => TicketAction::AddMore,
        ("filters", None, None) => TicketAction::HistoryFilters,
        ("cancel", Some(id), None) => TicketAction::Cancel(parse_ticket_id(id)?),
        ("show", Some(id), None) => TicketAction::Show(parse_ticket_id(id)?),
        ("hist", Some(word), Some(page)) => TicketAction::History {
            status: TicketStatus::from_command_word(word)?,
            page: page.parse::<u32>().ok()?.max(1),
        },
        _ => return None,
    };
    Some(action)
}

/// Commands typed by staff inside a ticket topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopicCommand {
    Panel,
    SetStatus(TicketStatus),
}

impl TopicCommand {
    pub fn parse(text: &str) -> Option<Self> {
        let (cmd, _) = parse_command(text)?;
        match cmd.as_str() {
            "panel" => Some(Self::Panel),
            other => TicketStatus::from_command_word(other).map(Self::SetStatus),
        }
    }
}

/// Split `/cmd@botname args` into (`cmd`, `args`). `None` for non-commands.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }
    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();
    if cmd.is_empty() {
        return None;
    }
    Some((cmd, rest))
}
