//! Account-level risk manager
//!
//! Evaluates signals against limits, sizes approved trades, tracks realized
//! P&L windows and drawdown, and owns the circuit breaker.

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use super::limits::{DrawdownMonitor, HaltReason, RiskLevel};
use super::sizing::{PositionSizer, SizingResult};
use super::types::{Approval, DrawdownInfo, RiskEvent, RiskEventKind, RiskStatus};
use crate::config::{RiskConfig, SizingMethod};
use crate::error::{RejectReason, Result, TradingError};
use crate::ledger::AccountSummary;
use crate::signal::Signal;
use crate::telemetry::{self, GaugeMetric, LatencyMetric};

/// Risk events kept for `recent_events`
const MAX_EVENTS: usize = 100;

/// Risk manager for one account
#[derive(Debug)]
pub struct RiskManager {
    config: RiskConfig,
    sizer: PositionSizer,
    monitor: DrawdownMonitor,
    level: RiskLevel,
    consecutive_losses: u32,
    total_trades: u64,
    pnl_history: VecDeque<Decimal>,
    halt_reason: Option<HaltReason>,
    halted_until: Option<DateTime<Utc>>,
    events: VecDeque<RiskEvent>,
    /// Events not yet handed out by `take_new_events`
    unpublished: Vec<RiskEvent>,
}

impl RiskManager {
    /// Create a risk manager starting from the given equity
    pub fn new(config: RiskConfig, initial_equity: Decimal) -> Self {
        Self::new_at(config, initial_equity, Utc::now())
    }

    /// Create a risk manager whose day/week windows start at `now`
    pub fn new_at(config: RiskConfig, initial_equity: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            sizer: PositionSizer::new(config.clone()),
            config,
            monitor: DrawdownMonitor::new(initial_equity, now),
            level: RiskLevel::Normal,
            consecutive_losses: 0,
            total_trades: 0,
            pnl_history: VecDeque::new(),
            halt_reason: None,
            halted_until: None,
            events: VecDeque::new(),
            unpublished: Vec::new(),
        }
    }

    /// Limits in force
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Evaluate a signal against the account and size it
    pub fn evaluate(&mut self, signal: &Signal, account: &AccountSummary) -> Result<Approval> {
        self.evaluate_at(signal, account, Utc::now())
    }

    /// Evaluate a signal as of `now`
    ///
    /// Checks run in a fixed order: halt expiry, equity refresh, halted
    /// rejection, limit breach, signal validity, risk/reward, position
    /// counts, then sizing.
    pub fn evaluate_at(
        &mut self,
        signal: &Signal,
        account: &AccountSummary,
        now: DateTime<Utc>,
    ) -> Result<Approval> {
        let started = Instant::now();
        let outcome = self.evaluate_inner(signal, account, now);
        telemetry::record_latency(LatencyMetric::SignalEvaluation, started.elapsed());

        if let Err(TradingError::RiskRejected(reason)) = &outcome {
            self.push_event(
                RiskEventKind::Rejected {
                    reason: *reason,
                    symbol: signal.symbol.clone(),
                },
                now,
            );
            telemetry::record_rejection(*reason);
            info!(symbol = %signal.symbol, %reason, "Signal rejected");
        }
        outcome
    }

    fn evaluate_inner(
        &mut self,
        signal: &Signal,
        account: &AccountSummary,
        now: DateTime<Utc>,
    ) -> Result<Approval> {
        self.expire_halt(now);
        self.monitor.update(account.equity, now);

        if self.is_halted() {
            return Err(TradingError::RiskRejected(RejectReason::TradingHalted));
        }

        if let Some(reason) = self.monitor.should_halt(&self.config) {
            self.halt(reason.clone(), now);
            return Err(TradingError::CircuitBreakerTripped(reason));
        }

        let risk_reward = Self::validate(signal)?;
        if risk_reward < self.config.min_risk_reward {
            return Err(TradingError::RiskRejected(RejectReason::BelowMinRiskReward));
        }

        let has_position = account.has_position(&signal.symbol);
        let open_after = account.open_positions + usize::from(!has_position);
        if open_after > self.config.max_open_positions {
            return Err(TradingError::RiskRejected(RejectReason::PositionLimitExceeded));
        }
        let symbol_entries = usize::from(has_position) + 1;
        if symbol_entries > self.config.max_positions_per_symbol {
            return Err(TradingError::RiskRejected(RejectReason::SymbolLimitExceeded));
        }

        let equity = account.equity;
        let raw = self.initial_size(signal, equity);
        let scaled = PositionSizer::scale_by_strength(raw.size, signal.strength);
        let limited = self.sizer.apply_limits(raw.with_size(scaled), equity);
        let size = PositionSizer::round_to_step_size(limited.size, self.config.step_size);
        if size <= dec!(0) {
            return Err(TradingError::RiskRejected(RejectReason::ZeroSize));
        }

        Ok(Approval {
            signal: signal.clone(),
            size,
            sizing: limited.with_size(size),
            risk_reward,
        })
    }

    fn validate(signal: &Signal) -> Result<Decimal> {
        if signal.symbol.trim().is_empty() {
            return Err(TradingError::InvalidInput("signal symbol is empty".into()));
        }
        for (name, value) in [
            ("entry_price", signal.entry_price),
            ("stop_loss", signal.stop_loss),
            ("take_profit", signal.take_profit),
        ] {
            if value <= dec!(0) {
                return Err(TradingError::InvalidInput(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        signal.risk_reward().ok_or_else(|| {
            TradingError::InvalidInput(format!(
                "stop loss {} is not on the losing side of entry {}",
                signal.stop_loss, signal.entry_price
            ))
        })
    }

    fn initial_size(&self, signal: &Signal, equity: Decimal) -> SizingResult {
        let (entry, stop, direction) = (signal.entry_price, signal.stop_loss, signal.direction);
        match self.config.sizing_method {
            SizingMethod::Risk => self.sizer.size_by_risk(equity, entry, stop, direction),
            SizingMethod::Atr => match signal.atr {
                Some(atr) => {
                    self.sizer
                        .size_by_atr(equity, entry, atr, self.config.atr_multiplier, direction)
                }
                None => self.sizer.size_by_risk(equity, entry, stop, direction),
            },
            SizingMethod::Kelly => {
                let fraction = self.kelly_fraction();
                self.sizer
                    .size_by_fraction(equity, fraction, entry, stop, direction)
            }
            SizingMethod::OptimalF => {
                let history: Vec<Decimal> = self.pnl_history.iter().copied().collect();
                let fraction = self.sizer.optimal_f(&history);
                self.sizer
                    .size_by_fraction(equity, fraction, entry, stop, direction)
            }
        }
    }

    fn kelly_fraction(&self) -> Decimal {
        let wins: Vec<Decimal> = self.pnl_history.iter().copied().filter(|p| *p > dec!(0)).collect();
        let losses: Vec<Decimal> = self.pnl_history.iter().copied().filter(|p| *p < dec!(0)).collect();
        if wins.is_empty() || losses.is_empty() {
            return self.config.default_fraction;
        }
        let total = Decimal::from(self.pnl_history.len());
        let win_rate = Decimal::from(wins.len()) / total;
        let avg_win = wins.iter().sum::<Decimal>() / Decimal::from(wins.len());
        let avg_loss = losses.iter().sum::<Decimal>().abs() / Decimal::from(losses.len());
        self.sizer.kelly_size(win_rate, avg_win, avg_loss)
    }

    /// Record the realized P&L of a closing trade
    pub fn record_trade(&mut self, pnl: Decimal) {
        self.record_trade_at(pnl, Utc::now())
    }

    /// Record a closing trade as of `now`
    ///
    /// A loss that brings the losing streak to the configured maximum trips
    /// the circuit breaker.
    pub fn record_trade_at(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        self.expire_halt(now);
        self.monitor.record_pnl(pnl, now);
        self.total_trades += 1;

        self.pnl_history.push_back(pnl);
        while self.pnl_history.len() > self.config.trade_history.max(1) {
            self.pnl_history.pop_front();
        }

        if pnl < dec!(0) {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }

        if self.config.circuit_breaker_enabled
            && !self.is_halted()
            && self.consecutive_losses >= self.config.max_consecutive_losses
        {
            self.halt(HaltReason::ConsecutiveLosses(self.consecutive_losses), now);
        }
        self.assess(now);
        telemetry::set_decimal_gauge(GaugeMetric::DailyPnl, self.monitor.daily_pnl);
    }

    /// Feed a fresh equity mark
    pub fn update_equity(&mut self, equity: Decimal) {
        self.update_equity_at(equity, Utc::now())
    }

    /// Feed a fresh equity mark as of `now`
    pub fn update_equity_at(&mut self, equity: Decimal, now: DateTime<Utc>) {
        self.expire_halt(now);
        self.monitor.update(equity, now);
        self.assess(now);
        telemetry::set_decimal_gauge(GaugeMetric::Equity, equity);
        telemetry::set_decimal_gauge(GaugeMetric::Drawdown, self.monitor.current_drawdown());
    }

    fn assess(&mut self, now: DateTime<Utc>) {
        if self.is_halted() {
            return;
        }
        if let Some(reason) = self.monitor.should_halt(&self.config) {
            self.halt(reason, now);
            return;
        }
        match (self.monitor.warning(&self.config), self.level) {
            (Some((metric, value, limit)), RiskLevel::Normal) => {
                self.level = RiskLevel::Warning;
                warn!(metric, %value, %limit, "Risk warning");
                self.push_event(
                    RiskEventKind::Warning {
                        metric: metric.to_string(),
                        value,
                        limit,
                    },
                    now,
                );
            }
            (None, RiskLevel::Warning) => {
                self.level = RiskLevel::Normal;
                info!("Risk metrics back below warning levels");
                self.push_event(RiskEventKind::Recovered, now);
            }
            _ => {}
        }
    }

    fn halt(&mut self, reason: HaltReason, now: DateTime<Utc>) {
        let until = match reason {
            HaltReason::InvariantViolation(_) => None,
            _ => i64::try_from(self.config.halt_duration_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|d| now.checked_add_signed(d)),
        };
        warn!(%reason, halted_until = ?until, "Trading halted");
        telemetry::record_halt(&reason);
        self.level = RiskLevel::Halted;
        self.halt_reason = Some(reason.clone());
        self.halted_until = until;
        self.push_event(RiskEventKind::Halted { reason }, now);
    }

    /// Lift an elapsed halt. The losing streak is kept, so one more loss re-trips.
    fn expire_halt(&mut self, now: DateTime<Utc>) {
        if self.level != RiskLevel::Halted {
            return;
        }
        if matches!(self.halted_until, Some(until) if now >= until) {
            info!("Halt expired, trading may resume");
            self.clear_halt();
            self.push_event(RiskEventKind::Resumed { manual: false }, now);
        }
    }

    fn clear_halt(&mut self) {
        self.level = RiskLevel::Normal;
        self.halt_reason = None;
        self.halted_until = None;
    }

    /// Halt immediately, e.g. after a ledger invariant violation
    ///
    /// Invariant halts never expire on their own.
    pub fn force_halt(&mut self, reason: HaltReason) {
        self.halt(reason, Utc::now());
    }

    /// Manually lift a halt and clear the losing streak
    ///
    /// Peak equity and max drawdown are kept.
    pub fn reset_circuit_breaker(&mut self) {
        self.reset_circuit_breaker_at(Utc::now())
    }

    /// Manual reset as of `now`
    pub fn reset_circuit_breaker_at(&mut self, now: DateTime<Utc>) {
        self.clear_halt();
        self.consecutive_losses = 0;
        info!("Circuit breaker reset");
        self.push_event(RiskEventKind::Resumed { manual: true }, now);
    }

    /// Whether trading is halted
    pub fn is_halted(&self) -> bool {
        self.level == RiskLevel::Halted
    }

    /// Current state machine level
    pub fn level(&self) -> RiskLevel {
        self.level
    }

    /// Why trading is halted, if it is
    pub fn halt_reason(&self) -> Option<&HaltReason> {
        self.halt_reason.as_ref()
    }

    /// Snapshot of the account's risk state
    pub fn status(&self) -> RiskStatus {
        RiskStatus {
            level: self.level,
            equity: self.monitor.current_equity,
            peak_equity: self.monitor.peak_equity,
            current_drawdown: self.monitor.current_drawdown(),
            max_drawdown: self.monitor.max_drawdown,
            daily_pnl: self.monitor.daily_pnl,
            weekly_pnl: self.monitor.weekly_pnl,
            consecutive_losses: self.consecutive_losses,
            total_trades: self.total_trades,
            halted: self.is_halted(),
            halt_reason: self.halt_reason.clone(),
            halted_until: self.halted_until,
            timestamp: Utc::now(),
        }
    }

    /// Drawdown detail
    pub fn drawdown_info(&self) -> DrawdownInfo {
        let current = self.monitor.current_drawdown();
        DrawdownInfo {
            peak_equity: self.monitor.peak_equity,
            current_equity: self.monitor.current_equity,
            current_drawdown: current,
            max_drawdown: self.monitor.max_drawdown,
            limit: self.config.max_drawdown_pct,
            headroom: (self.config.max_drawdown_pct - current).max(dec!(0)),
            daily_start_equity: self.monitor.daily_start_equity,
            weekly_start_equity: self.monitor.weekly_start_equity,
        }
    }

    /// Up to `n` most recent risk events, oldest first
    pub fn recent_events(&self, n: usize) -> Vec<RiskEvent> {
        let skip = self.events.len().saturating_sub(n);
        self.events.iter().skip(skip).cloned().collect()
    }

    /// Events recorded since the last call, oldest first
    pub fn take_new_events(&mut self) -> Vec<RiskEvent> {
        std::mem::take(&mut self.unpublished)
    }

    fn push_event(&mut self, kind: RiskEventKind, timestamp: DateTime<Utc>) {
        let event = RiskEvent { kind, timestamp };
        if self.unpublished.len() >= MAX_EVENTS {
            self.unpublished.remove(0);
        }
        self.unpublished.push(event.clone());
        self.events.push_back(event);
        while self.events.len() > MAX_EVENTS {
            self.events.pop_front();
        }
    }
}
