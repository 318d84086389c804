//! Core of the Telegram pager: session store, polling loop, callback dispatch
//! and daemon lifecycle.
//!
//! This crate is framework-agnostic. Telegram lives behind the ports in
//! [`messaging::port`], implemented in the `pager-telegram` adapter crate.

pub mod config;
pub mod daemon;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod pagination;
pub mod polling;
pub mod publisher;
pub mod stats;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
