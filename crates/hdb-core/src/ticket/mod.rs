//! Ticket model and the status state machine.

pub mod lifecycle;
pub mod types;

pub use lifecycle::{StatusSource, TransitionOutcome};
pub use types::*;
