//! Strategy signal input
//!
//! Signals are produced by an external strategy layer and consumed by the
//! risk manager's evaluation.

mod types;

pub use types::{Direction, Signal};
