//! Outbound messaging abstractions. Telegram implements the port in `hdb-telegram`.

pub mod port;
pub mod throttled;
pub mod types;
