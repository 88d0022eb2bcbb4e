//! Courier — a conversational message dispatch engine.
//!
//! Single Rust binary. Users compose messages over Telegram in a short
//! dialogue; each confirmed message is scored against the available
//! transmission methods, sent through a pluggable transmitter, and logged to
//! a bounded store.
//!
//! See `DESIGN.md` for the architecture.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod dispatch;
pub mod session;
pub mod store;

pub mod engine;
pub mod maintenance;
pub mod telegram;
