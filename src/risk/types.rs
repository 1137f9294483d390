//! Risk management types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{HaltReason, RiskLevel, SizingResult};
use crate::error::RejectReason;
use crate::ledger::{OrderRequest, OrderSide};
use crate::signal::Signal;

/// A signal that passed every risk check, with its final size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub signal: Signal,
    /// Quantity after sizing, scaling, limits and step rounding
    pub size: Decimal,
    pub sizing: SizingResult,
    pub risk_reward: Decimal,
}

impl Approval {
    /// Market entry order carrying the signal's exits and tag
    pub fn to_order_request(&self) -> OrderRequest {
        OrderRequest::market(
            self.signal.symbol.clone(),
            OrderSide::entering(self.signal.direction),
            self.size,
        )
        .with_exits(Some(self.signal.stop_loss), Some(self.signal.take_profit))
        .with_tag(self.signal.strategy_tag.clone())
    }
}

/// Something the risk manager decided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskEventKind {
    /// A metric crossed its warning level
    Warning {
        metric: String,
        value: Decimal,
        limit: Decimal,
    },
    /// Trading halted
    Halted { reason: HaltReason },
    /// Halt lifted, by reset or by expiry
    Resumed { manual: bool },
    /// A signal was refused
    Rejected {
        reason: RejectReason,
        symbol: String,
    },
    /// Metrics fell back below warning levels
    Recovered,
}

/// Timestamped risk event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    #[serde(flatten)]
    pub kind: RiskEventKind,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of the account's risk state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskStatus {
    pub level: RiskLevel,
    pub equity: Decimal,
    pub peak_equity: Decimal,
    pub current_drawdown: Decimal,
    pub max_drawdown: Decimal,
    pub daily_pnl: Decimal,
    pub weekly_pnl: Decimal,
    pub consecutive_losses: u32,
    pub total_trades: u64,
    pub halted: bool,
    pub halt_reason: Option<HaltReason>,
    pub halted_until: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

/// Drawdown detail for dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownInfo {
    pub peak_equity: Decimal,
    pub current_equity: Decimal,
    pub current_drawdown: Decimal,
    pub max_drawdown: Decimal,
    /// Configured drawdown limit
    pub limit: Decimal,
    /// Limit minus current drawdown, floored at zero
    pub headroom: Decimal,
    pub daily_start_equity: Decimal,
    pub weekly_start_equity: Decimal,
}
