//! Core domain + application logic for the housing desk bot.
//!
//! This crate is framework-agnostic. Telegram and SQLite live behind ports
//! (traits) implemented in adapter crates.

pub mod album;
pub mod audit;
pub mod commands;
pub mod config;
pub mod desk;
pub mod domain;
pub mod drafts;
pub mod errors;
pub mod formatting;
pub mod forum;
pub mod keyboards;
pub mod logging;
pub mod messaging;
pub mod notify;
pub mod schedule;
pub mod staff;
pub mod store;
pub mod ticket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{Error, Result};
