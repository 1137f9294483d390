//! Risk management module
//!
//! Position sizing, limits, and the circuit breaker

mod limits;
mod manager;
mod sizing;
mod types;

pub use limits::{DrawdownMonitor, HaltReason, RiskLevel};
pub use manager::RiskManager;
pub use sizing::{PositionSizer, SizeLimit, SizingResult};
pub use types::{Approval, DrawdownInfo, RiskEvent, RiskEventKind, RiskStatus};
