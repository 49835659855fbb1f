//! Inline keyboards. Every button carries an encoded [`CallbackCommand`].

use crate::{
    commands::{CallbackCommand, TicketAction},
    domain::TicketId,
    formatting::{format_local, one_line},
    messaging::types::{InlineButton, InlineKeyboard},
    ticket::{Ticket, TicketPage, TicketStatus},
};

fn button(label: impl Into<String>, cmd: CallbackCommand) -> InlineButton {
    InlineButton::new(label, cmd.encode())
}

fn action(label: impl Into<String>, action: TicketAction) -> InlineButton {
    button(label, CallbackCommand::Ticket(action))
}

/// Status buttons under the panel message in a ticket topic.
pub fn status_panel(ticket_id: TicketId) -> InlineKeyboard {
    let buttons = TicketStatus::ALL
        .into_iter()
        .map(|target| {
            button(
                format!("{} {}", target.glyph(), target.label()),
                CallbackCommand::SetStatus { ticket_id, target },
            )
        })
        .collect();
    InlineKeyboard::default().row(buttons)
}

pub fn ticket_menu(active: Option<TicketId>) -> InlineKeyboard {
    let mut kb = InlineKeyboard::default();
    if let Some(id) = active {
        kb = kb.row(vec![action(
            format!("📂 Ticket #{id}"),
            TicketAction::Show(id),
        )]);
    }
    kb.row(vec![action("📝 New ticket", TicketAction::Start)])
        .row(vec![action("📚 My tickets", TicketAction::HistoryFilters)])
}

pub fn cancel_creation() -> InlineKeyboard {
    InlineKeyboard::default().row(vec![action("❌ Cancel", TicketAction::Abort)])
}

pub fn attachments_controls() -> InlineKeyboard {
    InlineKeyboard::default().row(vec![
        action("✅ Done", TicketAction::AttachmentsDone),
        action("❌ Cancel", TicketAction::Abort),
    ])
}

pub fn preview_controls() -> InlineKeyboard {
    InlineKeyboard::default()
        .row(vec![action("✅ Submit", TicketAction::Confirm)])
        .row(vec![
            action("✍️ Edit text", TicketAction::EditText),
            action("📎 Add files", TicketAction::AddMore),
        ])
        .row(vec![action("❌ Cancel", TicketAction::Abort)])
}

pub fn history_filters() -> InlineKeyboard {
    let filters = TicketStatus::ALL
        .into_iter()
        .map(|status| {
            action(
                format!("{} {}", status.glyph(), status.label()),
                TicketAction::History { status, page: 1 },
            )
        })
        .collect();
    InlineKeyboard::default()
        .row(filters)
        .row(vec![action("⬅️ Back", TicketAction::Menu)])
}

pub fn history_list(
    page: &TicketPage,
    status: TicketStatus,
    utc_offset_hours: i32,
) -> InlineKeyboard {
    let items = page
        .items
        .iter()
        .map(|t| {
            let created = format_local(t.created_at, utc_offset_hours);
            let date = created.split(' ').next().unwrap_or_default();
            let label = format!(
                "{} #{} · {} · {}",
                t.status.glyph(),
                t.id,
                date,
                one_line(&t.text, 24)
            );
            action(label, TicketAction::Show(t.id))
        })
        .collect();
    let mut kb = InlineKeyboard::one_per_row(items);

    let mut nav = Vec::new();
    if page.has_prev() {
        nav.push(action(
            "◀️",
            TicketAction::History {
                status,
                page: page.page - 1,
            },
        ));
    }
    if page.page_count() > 1 {
        nav.push(action(
            format!("{}/{}", page.page, page.page_count()),
            TicketAction::History {
                status,
                page: page.page,
            },
        ));
    }
    if page.has_next() {
        nav.push(action(
            "▶️",
            TicketAction::History {
                status,
                page: page.page + 1,
            },
        ));
    }
    kb = kb.row(nav);
    kb.row(vec![action("⬅️ Filters", TicketAction::HistoryFilters)])
}

pub fn ticket_detail(ticket: &Ticket) -> InlineKeyboard {
    let mut kb = InlineKeyboard::default();
    if ticket.status.is_active() {
        kb = kb.row(vec![action(
            "🚫 Cancel ticket",
            TicketAction::Cancel(ticket.id),
        )]);
    }
    kb.row(vec![action(
        "⬅️ Back",
        TicketAction::History {
            status: ticket.status,
            page: 1,
        },
    )])
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::UserId;

    fn ticket(id: i64, status: TicketStatus) -> Ticket {
        Ticket {
            id: TicketId(id),
            owner: UserId(1),
            text: "Leaking pipe in basement".into(),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            forum: None,
        }
    }

    fn decode(kb: &InlineKeyboard) -> Vec<CallbackCommand> {
        kb.buttons()
            .filter_map(|b| CallbackCommand::parse(&b.callback_data))
            .collect()
    }

    #[test]
    fn panel_offers_all_three_statuses() {
        let kb = status_panel(TicketId(7));
        let targets: Vec<TicketStatus> = decode(&kb)
            .into_iter()
            .filter_map(|c| match c {
                CallbackCommand::SetStatus { ticket_id, target } if ticket_id == TicketId(7) => {
                    Some(target)
                }
                _ => None,
            })
            .collect();
        assert_eq!(targets, TicketStatus::ALL.to_vec());
    }

    #[test]
    fn detail_offers_cancel_only_while_active() {
        let open = decode(&ticket_detail(&ticket(3, TicketStatus::Open)));
        assert!(open.contains(&CallbackCommand::Ticket(TicketAction::Cancel(TicketId(3)))));
        let closed = decode(&ticket_detail(&ticket(3, TicketStatus::Cancelled)));
        assert!(!closed
            .iter()
            .any(|c| matches!(c, CallbackCommand::Ticket(TicketAction::Cancel(_)))));
    }

    #[test]
    fn history_navigation_matches_page_position() {
        let page = TicketPage {
            items: vec![ticket(9, TicketStatus::Open)],
            total: 11,
            page: 3,
            page_size: 5,
        };
        let cmds = decode(&history_list(&page, TicketStatus::Open, 0));
        assert!(cmds.contains(&CallbackCommand::Ticket(TicketAction::History {
            status: TicketStatus::Open,
            page: 2
        })));
        assert!(!cmds.contains(&CallbackCommand::Ticket(TicketAction::History {
            status: TicketStatus::Open,
            page: 4
        })));
        assert!(cmds.contains(&CallbackCommand::Ticket(TicketAction::Show(TicketId(9)))));
    }
}
