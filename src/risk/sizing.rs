//! Position sizing
//!
//! Pure calculations over an immutable `RiskConfig`. The primary sizing call
//! (`size_by_risk`, `size_by_atr`, `size_by_fraction`) produces a
//! `SizingResult`; `apply_limits` then clamps it, and the remaining helpers
//! adjust a raw quantity in any order.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::signal::Direction;

/// Which cap reduced a sizing result last
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeLimit {
    /// Position value as a fraction of equity
    PositionSize,
    /// Absolute position value
    PositionValue,
    /// Amount at risk between entry and stop
    RiskPerTrade,
    /// Position value divided by equity
    Leverage,
}

/// A proposed trade size and the quantities derived from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingResult {
    pub direction: Direction,
    /// Quantity in base units
    pub size: Decimal,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    /// Absolute distance between entry and stop
    pub stop_distance: Decimal,
    /// size * entry
    pub value: Decimal,
    /// size * stop_distance
    pub risk_amount: Decimal,
    /// Last cap that reduced the size, if any
    pub limited_by: Option<SizeLimit>,
}

impl SizingResult {
    fn new(direction: Direction, size: Decimal, entry: Decimal, stop: Decimal) -> Self {
        let stop_distance = (entry - stop).abs();
        Self {
            direction,
            size,
            entry_price: entry,
            stop_price: stop,
            stop_distance,
            value: size * entry,
            risk_amount: size * stop_distance,
            limited_by: None,
        }
    }

    /// A result that trades nothing
    pub fn zero(direction: Direction, entry: Decimal, stop: Decimal) -> Self {
        Self::new(direction, dec!(0), entry, stop)
    }

    /// Same trade with a different size; value and risk follow
    pub fn with_size(mut self, size: Decimal) -> Self {
        self.size = size.max(dec!(0));
        self.value = self.size * self.entry_price;
        self.risk_amount = self.size * self.stop_distance;
        self
    }

    fn clamped(self, size: Decimal, limit: SizeLimit) -> Self {
        let mut result = self.with_size(size);
        result.limited_by = Some(limit);
        result
    }
}

/// Position sizer over a fixed risk configuration
#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: RiskConfig,
}

impl PositionSizer {
    /// Create a new position sizer
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// The configuration this sizer applies
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Size so that hitting the stop loses `max_risk_per_trade` of equity
    ///
    /// Returns a zero size when entry and stop coincide.
    pub fn size_by_risk(
        &self,
        equity: Decimal,
        entry: Decimal,
        stop: Decimal,
        direction: Direction,
    ) -> SizingResult {
        let zero = SizingResult::zero(direction, entry, stop);
        if equity <= dec!(0) || entry <= dec!(0) || zero.stop_distance <= dec!(0) {
            return zero;
        }
        let risk_amount = equity * self.config.max_risk_per_trade;
        zero.with_size(risk_amount / (entry - stop).abs())
    }

    /// Place the stop `atr * multiplier` away from entry, then size by risk
    pub fn size_by_atr(
        &self,
        equity: Decimal,
        entry: Decimal,
        atr: Decimal,
        multiplier: Decimal,
        direction: Direction,
    ) -> SizingResult {
        let offset = atr * multiplier;
        let stop = match direction {
            Direction::Long => entry - offset,
            Direction::Short => entry + offset,
        };
        if offset <= dec!(0) {
            return SizingResult::zero(direction, entry, stop);
        }
        self.size_by_risk(equity, entry, stop, direction)
    }

    /// Commit `fraction` of equity at the entry price
    pub fn size_by_fraction(
        &self,
        equity: Decimal,
        fraction: Decimal,
        entry: Decimal,
        stop: Decimal,
        direction: Direction,
    ) -> SizingResult {
        let zero = SizingResult::zero(direction, entry, stop);
        if equity <= dec!(0) || entry <= dec!(0) || fraction <= dec!(0) {
            return zero;
        }
        zero.with_size(equity * fraction / entry)
    }

    /// Clamp a result by the configured caps, in order
    ///
    /// Each cap recomputes value and risk before the next one looks at them.
    /// A value exactly at a cap is kept.
    pub fn apply_limits(&self, result: SizingResult, equity: Decimal) -> SizingResult {
        if equity <= dec!(0) || result.entry_price <= dec!(0) {
            return result.with_size(dec!(0));
        }
        let entry = result.entry_price;
        let mut result = result;

        let max_value = equity * self.config.max_position_size;
        if result.value > max_value {
            result = result.clamped(max_value / entry, SizeLimit::PositionSize);
        }

        if result.value > self.config.max_position_value {
            result = result.clamped(
                self.config.max_position_value / entry,
                SizeLimit::PositionValue,
            );
        }

        let max_risk = equity * self.config.max_risk_per_trade;
        if result.stop_distance > dec!(0) && result.risk_amount > max_risk {
            let capped = max_risk / result.stop_distance;
            result = result.clamped(capped, SizeLimit::RiskPerTrade);
        }

        let max_leveraged = equity * self.config.max_leverage;
        if result.value > max_leveraged {
            result = result.clamped(max_leveraged / entry, SizeLimit::Leverage);
        }

        result
    }

    /// Half-Kelly fraction of equity
    ///
    /// f* = (p*b - q) / b with b = avg_win / avg_loss, halved and clamped to
    /// `[0, max_position_size]`. Zero when there is no average loss.
    pub fn kelly_size(&self, win_rate: Decimal, avg_win: Decimal, avg_loss: Decimal) -> Decimal {
        let avg_loss = avg_loss.abs();
        if avg_loss.is_zero() || avg_win <= dec!(0) {
            return dec!(0);
        }
        let p = win_rate.max(dec!(0)).min(dec!(1));
        let q = dec!(1) - p;
        let b = avg_win / avg_loss;
        let kelly = (p * b - q) / b;
        (kelly * dec!(0.5))
            .max(dec!(0))
            .min(self.config.max_position_size)
    }

    /// Optimal-f fraction: half of the largest win over the largest loss
    ///
    /// Falls back to `default_fraction` without history or without a loss.
    pub fn optimal_f(&self, trade_pnls: &[Decimal]) -> Decimal {
        let max_loss = trade_pnls.iter().copied().filter(|p| *p < dec!(0)).min();
        let Some(max_loss) = max_loss else {
            return self.config.default_fraction.min(self.config.max_position_size);
        };
        let max_win = trade_pnls
            .iter()
            .copied()
            .filter(|p| *p > dec!(0))
            .max()
            .unwrap_or(dec!(0));
        (dec!(0.5) * max_win / max_loss.abs())
            .max(dec!(0))
            .min(self.config.max_position_size)
    }

    /// Scale between 0.5x (strength 0) and 1.0x (strength 1)
    pub fn scale_by_strength(size: Decimal, strength: Decimal) -> Decimal {
        let strength = strength.max(dec!(0)).min(dec!(1));
        size * (dec!(0.5) + dec!(0.5) * strength)
    }

    /// Shrink size when volatility runs above target; never grows it
    pub fn volatility_adjust(size: Decimal, volatility: Decimal, target: Decimal) -> Decimal {
        if volatility <= dec!(0) || target <= dec!(0) {
            return size;
        }
        size * (target / volatility).min(dec!(1))
    }

    /// Shrink size in proportion to positive correlation with the book
    pub fn correlation_adjust(&self, size: Decimal, correlation: Decimal) -> Decimal {
        let correlation = correlation.max(dec!(-1)).min(dec!(1)).max(dec!(0));
        let factor = (dec!(1) - correlation * self.config.correlation_penalty).max(dec!(0));
        size * factor
    }

    /// Round down to a whole number of steps
    pub fn round_to_step_size(size: Decimal, step: Decimal) -> Decimal {
        if step <= dec!(0) {
            return size;
        }
        (size / step).floor() * step
    }
}
