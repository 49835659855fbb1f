//! Telegram HTML rendering helpers and resident-facing ticket cards.

use chrono::{DateTime, FixedOffset, Utc};

use crate::ticket::{RequesterProfile, StatusCounts, Ticket, TicketPage, TicketStatus};

/// Placeholder for absent profile fields.
pub const DASH: &str = "—";

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `dd.mm.YYYY HH:MM` at a fixed UTC offset.
pub fn format_local(ts: DateTime<Utc>, utc_offset_hours: i32) -> String {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
        .or_else(|| FixedOffset::east_opt(0));
    match offset {
        Some(offset) => ts.with_timezone(&offset).format("%d.%m.%Y %H:%M").to_string(),
        None => ts.format("%d.%m.%Y %H:%M").to_string(),
    }
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

/// Collapse newlines and truncate, for button labels.
pub fn one_line(text: &str, max_len: usize) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() <= max_len {
        return cleaned;
    }
    format!("{}…", cleaned.chars().take(max_len).collect::<String>())
}

pub fn or_dash(value: Option<&str>) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => escape_html(v),
        None => DASH.to_string(),
    }
}

/// Requester line: `Name (@username)`.
pub fn requester_line(profile: Option<&RequesterProfile>) -> String {
    let Some(p) = profile else {
        return DASH.to_string();
    };
    let mut out = or_dash(Some(&p.name));
    if let Some(u) = p.username.as_deref().filter(|u| !u.trim().is_empty()) {
        out.push_str(&format!(" (@{})", escape_html(u.trim())));
    }
    out
}

pub fn preview_text(
    text: &str,
    attachments: usize,
    profile: Option<&RequesterProfile>,
) -> String {
    let files = if attachments > 0 {
        format!("{attachments} pcs.")
    } else {
        "none".to_string()
    };
    format!(
        "👷 <b>Ticket preview</b>\n\n\
         👤 <b>Requester:</b> {}\n\
         🏠 <b>Address:</b> {}\n\
         🗒 <b>Text:</b>\n{}\n\n\
         📎 <b>Attachments:</b> {files}\n\n\
         Is everything correct?",
        requester_line(profile),
        or_dash(profile.and_then(|p| p.address.as_deref())),
        escape_html(text),
    )
}

/// Owner-facing ticket card.
pub fn ticket_card(ticket: &Ticket, address: Option<&str>, utc_offset_hours: i32) -> String {
    format!(
        "📂 <b>Ticket #{}</b>\n\
         Status: <b>{}</b>\n\
         Address: {}\n\
         Created: {}\n\
         Updated: {}\n\n\
         🗒 <b>Text:</b>\n{}",
        ticket.id,
        ticket.status.label(),
        or_dash(address),
        format_local(ticket.created_at, utc_offset_hours),
        format_local(ticket.updated_at, utc_offset_hours),
        escape_html(&ticket.text),
    )
}

pub fn history_header(page: &TicketPage, status: TicketStatus) -> String {
    if page.items.is_empty() {
        format!("📭 No tickets with status «{}».", status.label())
    } else {
        format!(
            "📋 Your tickets: «{}» ({} total)\nChoose a ticket below:",
            status.label(),
            page.total
        )
    }
}

pub fn history_menu_text(counts: &StatusCounts) -> String {
    format!(
        "📚 Ticket history\n\
         🟢 {}: {} · 🟡 {}: {} · 🟣 {}: {}\n\
         Choose a filter:",
        TicketStatus::Open.label(),
        counts.open,
        TicketStatus::Work.label(),
        counts.work,
        TicketStatus::Cancelled.label(),
        counts.cancelled,
    )
}
