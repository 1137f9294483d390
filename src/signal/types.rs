//! Signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade direction requested by a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Profit when price rises
    Long,
    /// Profit when price falls
    Short,
}

impl Direction {
    /// +1 for long, -1 for short
    pub fn sign(self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

/// A trading signal from the strategy layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Trading symbol (e.g., "ETHUSDT")
    pub symbol: String,
    /// Trade direction
    pub direction: Direction,
    /// Intended entry price
    pub entry_price: Decimal,
    /// Protective stop price
    pub stop_loss: Decimal,
    /// Profit target price
    pub take_profit: Decimal,
    /// Name of the strategy that produced the signal
    pub strategy_tag: String,
    /// Conviction in [0, 1]
    pub strength: Decimal,
    /// Average true range at signal time, used by ATR sizing
    #[serde(default)]
    pub atr: Option<Decimal>,
    /// Signal generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Create a new signal stamped with the current time
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        strategy_tag: impl Into<String>,
        strength: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            entry_price,
            stop_loss,
            take_profit,
            strategy_tag: strategy_tag.into(),
            strength,
            atr: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach an ATR reading
    pub fn with_atr(mut self, atr: Decimal) -> Self {
        self.atr = Some(atr);
        self
    }

    /// Distance from entry to stop, positive when the stop is on the losing side
    pub fn risk_distance(&self) -> Decimal {
        (self.entry_price - self.stop_loss) * self.direction.sign()
    }

    /// Distance from entry to target, positive when the target is on the winning side
    pub fn reward_distance(&self) -> Decimal {
        (self.take_profit - self.entry_price) * self.direction.sign()
    }

    /// Reward distance divided by risk distance, `None` when risk distance is not positive
    pub fn risk_reward(&self) -> Option<Decimal> {
        let risk = self.risk_distance();
        if risk <= Decimal::ZERO {
            return None;
        }
        Some(self.reward_distance() / risk)
    }
}
