use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{TicketId, TopicRef, UserId};

use super::lifecycle::TransitionOutcome;

/// Ticket status. CANCELLED is terminal and is shown to people as "completed".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Work,
    Cancelled,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 3] = [Self::Open, Self::Work, Self::Cancelled];

    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Work => "work",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "work" => Some(Self::Work),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Word used by staff in topic commands and panel buttons (`/open`, `/work`, `/done`).
    pub fn command_word(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Work => "work",
            Self::Cancelled => "done",
        }
    }

    pub fn from_command_word(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "work" => Some(Self::Work),
            "done" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Work => "In progress",
            Self::Cancelled => "Completed",
        }
    }

    /// Indicator used in forum topic titles and buttons.
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Open => "🟢",
            Self::Work => "🟡",
            Self::Cancelled => "🟣",
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::Work)
    }
}

/// Kind of media attached to a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Voice => "voice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(Self::Photo),
            "video" => Some(Self::Video),
            "document" => Some(Self::Document),
            "audio" => Some(Self::Audio),
            "voice" => Some(Self::Voice),
            _ => None,
        }
    }

    /// Voice notes cannot carry a caption.
    pub fn supports_caption(self) -> bool {
        !matches!(self, Self::Voice)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub id: TicketId,
    pub owner: UserId,
    pub text: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub forum: Option<TopicRef>,
}

/// An attachment collected while drafting, not yet bound to a ticket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DraftAttachment {
    pub kind: MediaKind,
    pub file_id: String,
    pub file_unique_id: Option<String>,
    pub caption: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub id: i64,
    pub ticket_id: TicketId,
    pub kind: MediaKind,
    pub file_id: String,
    pub file_unique_id: Option<String>,
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of the single status mutation point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub ticket_id: TicketId,
    pub from: TicketStatus,
    pub to: TicketStatus,
    /// Contact id of the ticket owner, for notifications.
    pub owner: UserId,
    pub outcome: TransitionOutcome,
}

impl StatusChange {
    pub fn applied(&self) -> bool {
        self.outcome == TransitionOutcome::Applied
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketPage {
    pub items: Vec<Ticket>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl TicketPage {
    pub fn page_count(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size)) as u32
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count()
    }
}

/// Normalize a 1-based page number into a row offset.
pub fn page_offset(page: u32, page_size: u32) -> u64 {
    u64::from(page.max(1) - 1) * u64::from(page_size)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub open: u64,
    pub work: u64,
    pub cancelled: u64,
}

impl StatusCounts {
    pub fn active(&self) -> u64 {
        self.open + self.work
    }

    pub fn total(&self) -> u64 {
        self.open + self.work + self.cancelled
    }

    pub fn bump(&mut self, status: TicketStatus) {
        match status {
            TicketStatus::Open => self.open += 1,
            TicketStatus::Work => self.work += 1,
            TicketStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// A resident profile as registered through the bot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub telegram_id: i64,
    pub username: String,
    pub name: String,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub house: Option<String>,
    pub apartment: Option<String>,
}

impl UserProfile {
    /// `street, h. house[, apt. apartment]`, or `None` when no street/house is known.
    pub fn address(&self) -> Option<String> {
        let street = self.street.as_deref().unwrap_or("").trim();
        let house = self.house.as_deref().unwrap_or("").trim();
        if street.is_empty() && house.is_empty() {
            return None;
        }
        let mut out = format!("{street}, h. {house}");
        if let Some(apt) = self.apartment.as_deref().filter(|a| !a.trim().is_empty()) {
            out.push_str(&format!(", apt. {}", apt.trim()));
        }
        Some(out)
    }
}

/// What staff see about the person behind a ticket.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequesterProfile {
    pub name: String,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<&UserProfile> for RequesterProfile {
    fn from(p: &UserProfile) -> Self {
        Self {
            name: p.name.clone(),
            username: Some(p.username.clone()).filter(|u| !u.trim().is_empty()),
            phone: p.phone.clone().filter(|s| !s.trim().is_empty()),
            address: p.address(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_words_round_trip_through_commands() {
        for s in TicketStatus::ALL {
            assert_eq!(TicketStatus::from_command_word(s.command_word()), Some(s));
            assert_eq!(TicketStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(TicketStatus::from_command_word("cancelled"), None);
        assert_eq!(TicketStatus::parse("done"), None);
    }

    #[test]
    fn page_math() {
        let p = TicketPage {
            items: vec![],
            total: 11,
            page: 2,
            page_size: 5,
        };
        assert_eq!(p.page_count(), 3);
        assert!(p.has_prev());
        assert!(p.has_next());
        assert_eq!(page_offset(0, 5), 0);
        assert_eq!(page_offset(3, 5), 10);
    }

    #[test]
    fn address_formats_optional_apartment() {
        let mut p = UserProfile {
            street: Some("Lenina".into()),
            house: Some("5".into()),
            ..Default::default()
        };
        assert_eq!(p.address().as_deref(), Some("Lenina, h. 5"));
        p.apartment = Some("12".into());
        assert_eq!(p.address().as_deref(), Some("Lenina, h. 5, apt. 12"));
        assert_eq!(UserProfile::default().address(), None);
    }
}
