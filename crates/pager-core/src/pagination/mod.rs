//! Pagination model: session state, callback data, rendering and page splitting.

pub mod callback_data;
pub mod session;
pub mod split;
pub mod view;

pub use callback_data::{CallbackData, PageAction};
pub use session::{Navigation, PageTurn, PaginationSession};
pub use split::split_pages;
pub use view::{nav_keyboard, render_page};
