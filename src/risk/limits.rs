//! Drawdown and loss-window tracking

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;

/// Reason for trading halt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum HaltReason {
    /// Too many losing trades in a row
    ConsecutiveLosses(u32),
    /// Drawdown from peak equity beyond the limit
    MaxDrawdownReached(Decimal),
    /// Realized daily loss beyond the limit
    MaxDailyLossReached(Decimal),
    /// Realized weekly loss beyond the limit
    MaxWeeklyLossReached(Decimal),
    /// Ledger corruption detected; only a manual reset resumes
    InvariantViolation(String),
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::ConsecutiveLosses(n) => write!(f, "{} consecutive losing trades", n),
            HaltReason::MaxDrawdownReached(dd) => write!(f, "drawdown {} exceeds limit", dd),
            HaltReason::MaxDailyLossReached(l) => write!(f, "daily loss {} exceeds limit", l),
            HaltReason::MaxWeeklyLossReached(l) => write!(f, "weekly loss {} exceeds limit", l),
            HaltReason::InvariantViolation(msg) => write!(f, "invariant violation: {}", msg),
        }
    }
}

/// Risk manager state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Normal,
    /// Close to a limit; trading continues
    Warning,
    Halted,
}

/// Monitors equity drawdown and realized P&L windows
#[derive(Debug, Clone)]
pub struct DrawdownMonitor {
    /// Peak equity value
    pub peak_equity: Decimal,
    /// Current equity value
    pub current_equity: Decimal,
    /// Worst drawdown seen so far
    pub max_drawdown: Decimal,
    /// Equity at start of day
    pub daily_start_equity: Decimal,
    /// Equity at start of ISO week
    pub weekly_start_equity: Decimal,
    /// Today's realized P&L
    pub daily_pnl: Decimal,
    /// This week's realized P&L
    pub weekly_pnl: Decimal,
    day: NaiveDate,
    week: (i32, u32),
}

impl DrawdownMonitor {
    /// Create a new drawdown monitor
    pub fn new(initial_equity: Decimal, now: DateTime<Utc>) -> Self {
        let day = now.date_naive();
        let iso = day.iso_week();
        Self {
            peak_equity: initial_equity,
            current_equity: initial_equity,
            max_drawdown: dec!(0),
            daily_start_equity: initial_equity,
            weekly_start_equity: initial_equity,
            daily_pnl: dec!(0),
            weekly_pnl: dec!(0),
            day,
            week: (iso.year(), iso.week()),
        }
    }

    /// Start new day/week windows when `now` has moved past the current ones
    pub fn roll(&mut self, now: DateTime<Utc>) {
        let day = now.date_naive();
        if day != self.day {
            self.day = day;
            self.daily_start_equity = self.current_equity;
            self.daily_pnl = dec!(0);
        }
        let iso = day.iso_week();
        let week = (iso.year(), iso.week());
        if week != self.week {
            self.week = week;
            self.weekly_start_equity = self.current_equity;
            self.weekly_pnl = dec!(0);
        }
    }

    /// Update with new equity value
    pub fn update(&mut self, new_equity: Decimal, now: DateTime<Utc>) {
        self.roll(now);
        self.current_equity = new_equity;
        if new_equity > self.peak_equity {
            self.peak_equity = new_equity;
        }
        let drawdown = self.current_drawdown();
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }
    }

    /// Add a realized trade result to the daily and weekly windows
    pub fn record_pnl(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        self.roll(now);
        self.daily_pnl += pnl;
        self.weekly_pnl += pnl;
    }

    /// Get current drawdown from peak
    pub fn current_drawdown(&self) -> Decimal {
        if self.peak_equity <= dec!(0) {
            return dec!(0);
        }
        ((self.peak_equity - self.current_equity) / self.peak_equity).max(dec!(0))
    }

    /// Realized loss today as a fraction of day-start equity
    pub fn daily_loss(&self) -> Decimal {
        Self::loss_fraction(self.daily_pnl, self.daily_start_equity)
    }

    /// Realized loss this week as a fraction of week-start equity
    pub fn weekly_loss(&self) -> Decimal {
        Self::loss_fraction(self.weekly_pnl, self.weekly_start_equity)
    }

    fn loss_fraction(pnl: Decimal, base: Decimal) -> Decimal {
        if base <= dec!(0) || pnl >= dec!(0) {
            return dec!(0);
        }
        -pnl / base
    }

    /// Check if trading should be halted
    pub fn should_halt(&self, limits: &RiskConfig) -> Option<HaltReason> {
        let daily = self.daily_loss();
        if daily > limits.max_daily_loss_pct {
            return Some(HaltReason::MaxDailyLossReached(daily));
        }

        let weekly = self.weekly_loss();
        if weekly > limits.max_weekly_loss_pct {
            return Some(HaltReason::MaxWeeklyLossReached(weekly));
        }

        let drawdown = self.current_drawdown();
        if drawdown > limits.max_drawdown_pct {
            return Some(HaltReason::MaxDrawdownReached(drawdown));
        }

        None
    }

    /// First metric at or past its warning level, as (name, value, limit)
    pub fn warning(&self, limits: &RiskConfig) -> Option<(&'static str, Decimal, Decimal)> {
        let t = limits.warning_threshold;
        [
            ("drawdown", self.current_drawdown(), limits.max_drawdown_pct),
            ("daily_loss", self.daily_loss(), limits.max_daily_loss_pct),
            ("weekly_loss", self.weekly_loss(), limits.max_weekly_loss_pct),
        ]
        .into_iter()
        .find(|(_, value, limit)| *value > dec!(0) && *value >= *limit * t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn monday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_drawdown_monitor() {
        let mut monitor = DrawdownMonitor::new(dec!(1000), monday());

        monitor.update(dec!(1100), monday()); // New peak
        assert_eq!(monitor.peak_equity, dec!(1100));
        assert_eq!(monitor.current_drawdown(), dec!(0));

        monitor.update(dec!(990), monday()); // Drawdown
        assert_eq!(monitor.current_drawdown(), dec!(0.10)); // 10%

        monitor.update(dec!(1045), monday());
        assert_eq!(monitor.current_drawdown(), dec!(0.05));
        assert_eq!(monitor.max_drawdown, dec!(0.10));
    }

    #[test]
    fn test_halt_on_drawdown() {
        let limits = RiskConfig::default(); // 15% drawdown limit
        let mut monitor = DrawdownMonitor::new(dec!(1000), monday());

        monitor.update(dec!(860), monday());
        assert!(monitor.should_halt(&limits).is_none());

        monitor.update(dec!(840), monday());
        assert!(matches!(
            monitor.should_halt(&limits),
            Some(HaltReason::MaxDrawdownReached(_))
        ));
    }

    #[test]
    fn test_halt_on_daily_loss() {
        let limits = RiskConfig::default(); // 5% daily
        let mut monitor = DrawdownMonitor::new(dec!(1000), monday());

        monitor.record_pnl(dec!(-30), monday());
        monitor.record_pnl(dec!(-25), monday());
        assert_eq!(monitor.daily_loss(), dec!(0.055));
        assert!(matches!(
            monitor.should_halt(&limits),
            Some(HaltReason::MaxDailyLossReached(_))
        ));
    }

    #[test]
    fn test_daily_window_rolls_but_weekly_accumulates() {
        let limits = RiskConfig::default(); // 5% daily, 10% weekly
        let mut monitor = DrawdownMonitor::new(dec!(1000), monday());

        monitor.record_pnl(dec!(-45), monday());
        let tuesday = monday() + Duration::days(1);
        monitor.record_pnl(dec!(-45), tuesday);
        monitor.record_pnl(dec!(-15), tuesday);

        assert_eq!(monitor.daily_pnl, dec!(-60));
        assert_eq!(monitor.weekly_pnl, dec!(-105));
        assert!(matches!(
            monitor.should_halt(&limits),
            Some(HaltReason::MaxDailyLossReached(_))
        ));

        let next_monday = monday() + Duration::days(7);
        monitor.roll(next_monday);
        assert_eq!(monitor.weekly_pnl, dec!(0));
        assert!(monitor.should_halt(&limits).is_none());
    }

    #[test]
    fn test_warning_threshold() {
        let limits = RiskConfig::default(); // 15% drawdown, warn at 80% = 12%
        let mut monitor = DrawdownMonitor::new(dec!(1000), monday());

        monitor.update(dec!(890), monday());
        assert!(monitor.warning(&limits).is_none());

        monitor.update(dec!(880), monday());
        let (metric, value, _) = monitor.warning(&limits).unwrap();
        assert_eq!(metric, "drawdown");
        assert_eq!(value, dec!(0.12));
    }

    #[test]
    fn test_halt_reason_display() {
        let reason = HaltReason::ConsecutiveLosses(5);
        assert_eq!(reason.to_string(), "5 consecutive losing trades");
    }
}
