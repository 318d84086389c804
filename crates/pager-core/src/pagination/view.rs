//! Rendering of a session into message text and navigation controls.

use crate::{
    messaging::types::{InlineButton, InlineKeyboard},
    pagination::{
        callback_data::{CallbackData, PageAction},
        session::{Navigation, PaginationSession},
    },
};

pub const PREV_LABEL: &str = "◀️ Prev";
pub const NEXT_LABEL: &str = "Next ▶️";

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Characters kept free for the position footer (`\n\n📄 20/20`) or the
/// batch-mode title suffix (` (20/20)`).
pub const FOOTER_RESERVE: usize = 16;

/// Visible characters a rendered page adds around its text: the title line
/// plus [`FOOTER_RESERVE`]. Markup is not counted; Telegram limits the text
/// after entity parsing.
pub fn chrome_len(title: Option<&str>) -> usize {
    let title = title
        .filter(|t| !t.trim().is_empty())
        .map_or(0, |t| t.chars().count() + 2);
    title + FOOTER_RESERVE
}

/// Message body for the current page: optional bold title, page text, position footer.
pub fn render_page(session: &PaginationSession) -> String {
    let mut out = String::new();
    if let Some(title) = session.title.as_deref().filter(|t| !t.trim().is_empty()) {
        out.push_str(&format!("<b>{}</b>\n\n", escape_html(title)));
    }
    out.push_str(&escape_html(session.current_text()));
    if session.total_pages() > 1 {
        out.push_str(&format!("\n\n📄 {}", session.position_label()));
    }
    out
}

/// Prev / indicator / next row. A button that would move past a boundary is left out.
pub fn nav_keyboard(session: &PaginationSession) -> InlineKeyboard {
    if session.total_pages() <= 1 {
        return InlineKeyboard::default();
    }

    let msg = session.message();
    let button = |label: String, action: PageAction| InlineButton {
        label,
        callback_data: CallbackData::new(msg, action).encode(),
    };

    let mut row = Vec::with_capacity(3);
    if session.current_page > 0 {
        row.push(button(
            PREV_LABEL.to_string(),
            PageAction::Navigate(Navigation::Previous),
        ));
    }
    row.push(button(session.position_label(), PageAction::Noop));
    if session.current_page < session.last_page() {
        row.push(button(
            NEXT_LABEL.to_string(),
            PageAction::Navigate(Navigation::Next),
        ));
    }

    InlineKeyboard::single_row(row)
}
