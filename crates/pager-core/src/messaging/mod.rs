//! Messaging platform ports and decorators.

pub mod port;
pub mod retry;
pub mod throttled;
pub mod types;
