//! Orchestrator state snapshots

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::{AccountSummary, OrderId};
use crate::risk::RiskStatus;
use crate::signal::Signal;

/// Global run state gating all trading activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingStatus {
    Stopped,
    Running,
    Paused,
    /// Stopped by the risk manager; only a circuit-breaker reset resumes
    Halted,
}

impl std::fmt::Display for TradingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradingStatus::Stopped => "stopped",
            TradingStatus::Running => "running",
            TradingStatus::Paused => "paused",
            TradingStatus::Halted => "halted",
        };
        f.write_str(s)
    }
}

/// What happened to a signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SignalOutcome {
    /// Received while not running; logged only
    Ignored { status: TradingStatus },
    /// Approved and filled
    Executed { order_id: OrderId, size: Decimal },
    /// Refused by a risk check
    Rejected { reason: String },
    /// Evaluation or placement failed
    Failed { error: String },
}

/// Audit entry for one received signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal: Signal,
    #[serde(flatten)]
    pub outcome: SignalOutcome,
    pub received_at: DateTime<Utc>,
}

/// A system error kept for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Component that reported the error
    pub source: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything a dashboard needs, rebuilt after each material event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingState {
    pub status: TradingStatus,
    pub account: AccountSummary,
    pub risk: RiskStatus,
    pub open_positions: usize,
    pub open_orders: usize,
    pub total_trades: usize,
    pub last_signal: Option<SignalRecord>,
    pub active_strategies: Vec<String>,
    /// Market regime label set by the strategy layer
    pub regime: Option<String>,
    /// Most recent errors, oldest first
    pub errors: Vec<ErrorRecord>,
    pub updated_at: DateTime<Utc>,
}
