//! Prometheus metrics

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::RejectReason;
use crate::ledger::{Order, OrderSide};
use crate::risk::HaltReason;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Risk evaluation of one signal
    SignalEvaluation,
    /// Ledger placement of one order
    OrderPlacement,
}

impl LatencyMetric {
    fn name(self) -> &'static str {
        match self {
            LatencyMetric::SignalEvaluation => "paperdesk_signal_evaluation_latency_ms",
            LatencyMetric::OrderPlacement => "paperdesk_order_placement_latency_ms",
        }
    }
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current equity
    Equity,
    /// Unrealized P&L
    UnrealizedPnl,
    /// Realized P&L
    RealizedPnl,
    /// Open position count
    OpenPositions,
    /// Current drawdown fraction
    Drawdown,
    /// Daily realized P&L
    DailyPnl,
    /// Registered broadcast subscribers
    Subscribers,
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::Equity => "paperdesk_equity",
            GaugeMetric::UnrealizedPnl => "paperdesk_unrealized_pnl",
            GaugeMetric::RealizedPnl => "paperdesk_realized_pnl",
            GaugeMetric::OpenPositions => "paperdesk_open_positions",
            GaugeMetric::Drawdown => "paperdesk_drawdown",
            GaugeMetric::DailyPnl => "paperdesk_daily_pnl",
            GaugeMetric::Subscribers => "paperdesk_broadcast_subscribers",
        }
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    histogram!(metric.name()).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    gauge!(metric.name()).set(value);
}

/// Set a gauge from a decimal amount
pub fn set_decimal_gauge(metric: GaugeMetric, value: Decimal) {
    set_gauge(metric, value.to_f64().unwrap_or_default());
}

/// Count a filled order
pub fn record_fill(order: &Order) {
    let side = match order.side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    };
    counter!("paperdesk_fills_total", "side" => side).increment(1);
    histogram!("paperdesk_fill_notional").record(
        (order.filled_quantity * order.avg_fill_price)
            .to_f64()
            .unwrap_or_default(),
    );
}

/// Count a signal refused by risk checks
pub fn record_rejection(reason: RejectReason) {
    counter!("paperdesk_risk_rejections_total", "reason" => reason.to_string()).increment(1);
}

/// Count a trading halt
pub fn record_halt(reason: &HaltReason) {
    let kind = match reason {
        HaltReason::ConsecutiveLosses(_) => "consecutive_losses",
        HaltReason::MaxDrawdownReached(_) => "max_drawdown",
        HaltReason::MaxDailyLossReached(_) => "max_daily_loss",
        HaltReason::MaxWeeklyLossReached(_) => "max_weekly_loss",
        HaltReason::InvariantViolation(_) => "invariant_violation",
    };
    counter!("paperdesk_halts_total", "reason" => kind).increment(1);
}

/// Count a broadcast subscriber dropped for a full or closed queue
pub fn record_subscriber_dropped() {
    counter!("paperdesk_broadcast_dropped_total").increment(1);
}

/// Count an error reported to the orchestrator
pub fn record_error(source: &'static str) {
    counter!("paperdesk_errors_total", "source" => source).increment(1);
}
