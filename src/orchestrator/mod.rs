//! Trading orchestrator
//!
//! Owns the global run state and ties the pieces together: signals go through
//! the risk manager into the execution engine, ledger events feed back into
//! the risk manager, and every material event rebuilds the `TradingState`
//! pushed to the broadcast hub.

mod state;

pub use state::{ErrorRecord, SignalOutcome, SignalRecord, TradingState, TradingStatus};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::broadcast::{BroadcastHub, IndicatorSnapshot, Payload, PositionUpdate};
use crate::config::{Config, OrchestratorConfig};
use crate::error::{RejectReason, Result, TradingError};
use crate::feed::{Candle, MarketEvent, PriceTick};
use crate::ledger::{
    AccountSummary, ExecutionEngine, LedgerEvent, Order, OrderId, OrderRequest, PaperLedger,
    PlaceOrderResult, Position, PositionId, Trade,
};
use crate::risk::{DrawdownInfo, HaltReason, RiskEvent, RiskManager, RiskStatus};
use crate::signal::Signal;
use crate::telemetry::{self, GaugeMetric, LatencyMetric};

/// Coordinates one account's engine, risk manager and subscribers
pub struct Orchestrator<E: ExecutionEngine = PaperLedger> {
    config: OrchestratorConfig,
    engine: Arc<E>,
    ledger_events: Mutex<mpsc::UnboundedReceiver<LedgerEvent>>,
    risk: Mutex<RiskManager>,
    status: RwLock<TradingStatus>,
    state: RwLock<TradingState>,
    hub: BroadcastHub,
    /// Serializes evaluate + place so at most one signal is in flight
    signal_gate: Mutex<()>,
    signals: Mutex<VecDeque<SignalRecord>>,
    errors: Mutex<VecDeque<ErrorRecord>>,
    strategies: RwLock<Vec<String>>,
    regime: RwLock<Option<String>>,
}

impl Orchestrator<PaperLedger> {
    /// Build a paper-trading orchestrator from configuration
    pub async fn new(config: &Config, hub: BroadcastHub) -> Self {
        let (ledger, events) = PaperLedger::with_events(config.account.clone());
        let risk = RiskManager::new(config.risk.clone(), config.account.initial_balance);
        Self::with_engine(
            Arc::new(ledger),
            events,
            risk,
            config.orchestrator.clone(),
            hub,
        )
        .await
    }
}

impl<E: ExecutionEngine> Orchestrator<E> {
    /// Build an orchestrator over any execution engine and its event queue
    pub async fn with_engine(
        engine: Arc<E>,
        ledger_events: mpsc::UnboundedReceiver<LedgerEvent>,
        risk: RiskManager,
        config: OrchestratorConfig,
        hub: BroadcastHub,
    ) -> Self {
        let account = engine.account_summary().await;
        let status = if config.auto_start {
            TradingStatus::Running
        } else {
            TradingStatus::Stopped
        };
        let state = TradingState {
            status,
            open_positions: account.open_positions,
            open_orders: account.open_orders,
            total_trades: account.total_trades,
            account,
            risk: risk.status(),
            last_signal: None,
            active_strategies: Vec::new(),
            regime: None,
            errors: Vec::new(),
            updated_at: Utc::now(),
        };
        Self {
            config,
            engine,
            ledger_events: Mutex::new(ledger_events),
            risk: Mutex::new(risk),
            status: RwLock::new(status),
            state: RwLock::new(state),
            hub,
            signal_gate: Mutex::new(()),
            signals: Mutex::new(VecDeque::new()),
            errors: Mutex::new(VecDeque::new()),
            strategies: RwLock::new(Vec::new()),
            regime: RwLock::new(None),
        }
    }

    /// The execution engine
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// The broadcast hub
    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Current run state
    pub async fn status(&self) -> TradingStatus {
        *self.status.read().await
    }

    /// Latest trading state snapshot
    pub async fn state(&self) -> TradingState {
        self.state.read().await.clone()
    }

    // ---- run state ----

    /// Stopped -> Running
    pub async fn start(&self) -> Result<TradingStatus> {
        self.transition("start", &[TradingStatus::Stopped], TradingStatus::Running)
            .await
    }

    /// Running -> Paused
    pub async fn pause(&self) -> Result<TradingStatus> {
        self.transition("pause", &[TradingStatus::Running], TradingStatus::Paused)
            .await
    }

    /// Paused -> Running
    pub async fn resume(&self) -> Result<TradingStatus> {
        self.transition("resume", &[TradingStatus::Paused], TradingStatus::Running)
            .await
    }

    /// Any state -> Stopped
    pub async fn stop(&self) -> Result<TradingStatus> {
        self.transition(
            "stop",
            &[
                TradingStatus::Stopped,
                TradingStatus::Running,
                TradingStatus::Paused,
                TradingStatus::Halted,
            ],
            TradingStatus::Stopped,
        )
        .await
    }

    async fn transition(
        &self,
        action: &str,
        from: &[TradingStatus],
        to: TradingStatus,
    ) -> Result<TradingStatus> {
        {
            let mut status = self.status.write().await;
            if !from.contains(&status) {
                return Err(TradingError::InvalidState(format!(
                    "cannot {} while {}",
                    action, *status
                )));
            }
            let previous = *status;
            info!(from = %previous, %to, "Trading status changed");
            *status = to;
        }
        self.sync().await;
        Ok(to)
    }

    /// Manually lift a risk halt; a halted orchestrator goes back to running
    pub async fn reset_circuit_breaker(&self) -> TradingStatus {
        self.risk.lock().await.reset_circuit_breaker();
        {
            let mut status = self.status.write().await;
            if *status == TradingStatus::Halted {
                info!("Circuit breaker reset, resuming trading");
                *status = TradingStatus::Running;
            }
        }
        // A limit still breached re-halts here
        self.sync().await;
        self.status().await
    }

    // ---- strategy and market input ----

    /// Evaluate and execute a strategy signal
    ///
    /// Signals received while not running are logged and broadcast only.
    /// Risk rejections and placement failures are reported in the outcome;
    /// the returned error is reserved for fatal ledger failures.
    pub async fn on_signal(&self, signal: Signal) -> Result<SignalOutcome> {
        let status = self.status().await;
        if status != TradingStatus::Running {
            debug!(symbol = %signal.symbol, %status, "Signal ignored");
            let outcome = SignalOutcome::Ignored { status };
            self.record_signal(signal, outcome.clone()).await;
            return Ok(outcome);
        }

        let gate = self.signal_gate.lock().await;
        let outcome = self.evaluate_and_place(&signal).await;
        drop(gate);

        let (outcome, fatal) = match outcome {
            Ok(outcome) => (outcome, None),
            Err(e) => {
                self.handle_error("signal", &e).await;
                let fatal = e.is_fatal().then(|| e.clone());
                (SignalOutcome::Failed { error: e.to_string() }, fatal)
            }
        };
        self.record_signal(signal, outcome.clone()).await;
        self.sync().await;

        match fatal {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    async fn evaluate_and_place(&self, signal: &Signal) -> Result<SignalOutcome> {
        // Status may have changed while waiting for the gate
        let status = self.status().await;
        if status != TradingStatus::Running {
            return Ok(SignalOutcome::Ignored { status });
        }

        let account = self.engine.account_summary().await;
        let evaluation = self.risk.lock().await.evaluate(signal, &account);
        let approval = match evaluation {
            Ok(approval) => approval,
            Err(TradingError::RiskRejected(reason)) => {
                return Ok(SignalOutcome::Rejected {
                    reason: reason.to_string(),
                })
            }
            Err(e) => return Err(e),
        };

        let started = Instant::now();
        let placed = self.engine.place_order(approval.to_order_request()).await;
        telemetry::record_latency(LatencyMetric::OrderPlacement, started.elapsed());
        let result = placed?;

        info!(
            symbol = %signal.symbol,
            direction = ?signal.direction,
            size = %approval.size,
            price = %result.order.avg_fill_price,
            strategy = %signal.strategy_tag,
            "Signal executed"
        );
        Ok(SignalOutcome::Executed {
            order_id: result.order.id,
            size: approval.size,
        })
    }

    /// Record a reference price, run exits and refresh state
    pub async fn update_price(
        &self,
        symbol: &str,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<PlaceOrderResult>> {
        let result = self.engine.update_price(symbol, price, timestamp).await;
        if let Err(e) = &result {
            self.handle_error("price", e).await;
        } else {
            self.hub.publish(Payload::Price(PriceTick {
                symbol: symbol.to_string(),
                price,
                timestamp,
            }));
        }
        self.sync().await;
        result
    }

    /// Mark the candle's close and broadcast it
    pub async fn on_candle_close(&self, candle: Candle) -> Result<Option<PlaceOrderResult>> {
        let result = self
            .engine
            .update_price(&candle.symbol, candle.close, candle.close_time)
            .await;
        if let Err(e) = &result {
            self.handle_error("candle", e).await;
        }
        self.hub.publish(Payload::Candle(candle));
        self.sync().await;
        result
    }

    /// Forward indicator values from the strategy layer to subscribers
    pub fn publish_indicators(&self, snapshot: IndicatorSnapshot) {
        self.hub.publish(Payload::Indicators(snapshot));
    }

    /// Consume market events until the channel closes
    ///
    /// Errors are logged and the loop continues.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<MarketEvent>) {
        info!("Orchestrator loop started");
        while let Some(event) = events.recv().await {
            let result = match event {
                MarketEvent::Price(tick) => self
                    .update_price(&tick.symbol, tick.price, tick.timestamp)
                    .await
                    .map(|_| ()),
                MarketEvent::Candle(candle) => self.on_candle_close(candle).await.map(|_| ()),
                MarketEvent::Signal(signal) => self.on_signal(signal).await.map(|_| ()),
            };
            if let Err(e) = result {
                warn!(error = %e, "Market event failed");
            }
        }
        info!("Market event stream ended");
    }

    // ---- manual trading ----

    /// Place an order directly, bypassing signal evaluation
    ///
    /// Refused while halted.
    pub async fn place_order(&self, request: OrderRequest) -> Result<PlaceOrderResult> {
        if self.status().await == TradingStatus::Halted {
            return Err(TradingError::RiskRejected(RejectReason::TradingHalted));
        }
        let result = self.engine.place_order(request).await;
        self.after_manual("place_order", &result).await;
        result
    }

    /// Cancel a pending or open order
    pub async fn cancel_order(&self, id: OrderId) -> Result<Order> {
        let result = self.engine.cancel_order(id).await;
        self.after_manual("cancel_order", &result).await;
        result
    }

    /// Flatten a position
    pub async fn close_position(&self, id: PositionId) -> Result<PlaceOrderResult> {
        let result = self.engine.close_position(id).await;
        self.after_manual("close_position", &result).await;
        result
    }

    /// Move a position's stop loss
    pub async fn update_stop_loss(&self, id: PositionId, price: Decimal) -> Result<Position> {
        let result = self.engine.update_stop_loss(id, price).await;
        self.after_manual("update_stop_loss", &result).await;
        result
    }

    /// Move a position's take profit
    pub async fn update_take_profit(&self, id: PositionId, price: Decimal) -> Result<Position> {
        let result = self.engine.update_take_profit(id, price).await;
        self.after_manual("update_take_profit", &result).await;
        result
    }

    async fn after_manual<T>(&self, action: &'static str, result: &Result<T>) {
        if let Err(e) = result {
            if e.is_fatal() {
                self.handle_error(action, e).await;
            } else {
                debug!(action, error = %e, "Manual request failed");
            }
        }
        self.sync().await;
    }

    // ---- queries ----

    /// Open positions
    pub async fn positions(&self) -> Vec<Position> {
        self.engine.positions().await
    }

    /// Orders still pending or open
    pub async fn open_orders(&self) -> Vec<Order> {
        self.engine.open_orders().await
    }

    /// Account summary
    pub async fn account_summary(&self) -> AccountSummary {
        self.engine.account_summary().await
    }

    /// Most recent trades
    pub async fn trades(&self, limit: Option<usize>) -> Vec<Trade> {
        self.engine.trades(limit).await
    }

    /// Risk state snapshot
    pub async fn risk_status(&self) -> RiskStatus {
        self.risk.lock().await.status()
    }

    /// Drawdown detail
    pub async fn drawdown_info(&self) -> DrawdownInfo {
        self.risk.lock().await.drawdown_info()
    }

    /// Up to `n` most recent risk events
    pub async fn recent_risk_events(&self, n: usize) -> Vec<RiskEvent> {
        self.risk.lock().await.recent_events(n)
    }

    /// Up to `n` most recent signals, oldest first
    pub async fn recent_signals(&self, n: usize) -> Vec<SignalRecord> {
        let signals = self.signals.lock().await;
        let skip = signals.len().saturating_sub(n);
        signals.iter().skip(skip).cloned().collect()
    }

    /// Recorded system errors, oldest first
    pub async fn errors(&self) -> Vec<ErrorRecord> {
        self.errors.lock().await.iter().cloned().collect()
    }

    // ---- dashboard setters ----

    /// Replace the list of active strategies
    pub async fn set_active_strategies(&self, strategies: Vec<String>) {
        *self.strategies.write().await = strategies;
        self.sync().await;
    }

    /// Set the market regime label
    pub async fn set_regime(&self, regime: Option<String>) {
        *self.regime.write().await = regime;
        self.sync().await;
    }

    /// Record an error raised outside the core, e.g. by a strategy
    pub async fn report_error(&self, source: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(source, %message, "Error reported");
        self.push_error(source, message).await;
        self.sync().await;
    }

    // ---- internals ----

    async fn record_signal(&self, signal: Signal, outcome: SignalOutcome) {
        let record = SignalRecord {
            signal,
            outcome,
            received_at: Utc::now(),
        };
        {
            let mut signals = self.signals.lock().await;
            signals.push_back(record.clone());
            while signals.len() > self.config.signal_history.max(1) {
                signals.pop_front();
            }
        }
        self.hub.publish(Payload::Signal(record));
    }

    async fn handle_error(&self, source: &'static str, err: &TradingError) {
        match err {
            TradingError::InvariantViolation(msg) => {
                error!(source, error = %err, "Ledger invariant violated, halting account");
                self.risk
                    .lock()
                    .await
                    .force_halt(HaltReason::InvariantViolation(msg.clone()));
                *self.status.write().await = TradingStatus::Halted;
            }
            TradingError::CircuitBreakerTripped(reason) => {
                warn!(source, %reason, "Circuit breaker tripped");
            }
            _ => warn!(source, error = %err, "Operation failed"),
        }
        telemetry::record_error(source);
        self.push_error(source, err.to_string()).await;
    }

    async fn push_error(&self, source: &str, message: String) {
        let record = ErrorRecord {
            source: source.to_string(),
            message,
            timestamp: Utc::now(),
        };
        {
            let mut errors = self.errors.lock().await;
            errors.push_back(record.clone());
            while errors.len() > self.config.max_errors.max(1) {
                errors.pop_front();
            }
        }
        self.hub.publish(Payload::Error(record));
    }

    /// Drain ledger events into the risk manager and out to subscribers
    ///
    /// The receiver stays locked until the batch is applied, so concurrent
    /// drains record trades in ledger order.
    async fn drain_ledger_events(&self) {
        let mut rx = self.ledger_events.lock().await;
        while let Ok(event) = rx.try_recv() {
            match event {
                LedgerEvent::Position {
                    kind,
                    position,
                    trade,
                } => {
                    if let Some(trade) = trade {
                        if kind.realizes_pnl() {
                            self.risk.lock().await.record_trade(trade.realized_pnl);
                        }
                        self.hub.publish(Payload::Trade(trade));
                    }
                    self.hub
                        .publish(Payload::Position(PositionUpdate { kind, position }));
                }
                LedgerEvent::ExitTriggered {
                    position_id,
                    symbol,
                    kind,
                    price,
                } => {
                    info!(position_id, %symbol, %kind, %price, "Exit triggered");
                }
                LedgerEvent::OrderFilled { order } => {
                    debug!(order_id = %order.id, symbol = %order.symbol, "Fill event");
                }
                LedgerEvent::OrderCanceled { order } => {
                    debug!(order_id = %order.id, symbol = %order.symbol, "Cancel event");
                }
            }
        }
    }

    /// Drain events, update risk, rebuild and broadcast the trading state
    async fn sync(&self) {
        self.drain_ledger_events().await;

        let account = self.engine.account_summary().await;
        let (risk_status, risk_events, halted) = {
            let mut risk = self.risk.lock().await;
            risk.update_equity(account.equity);
            (risk.status(), risk.take_new_events(), risk.is_halted())
        };

        let status = {
            let mut status = self.status.write().await;
            if halted && matches!(*status, TradingStatus::Running | TradingStatus::Paused) {
                warn!(reason = ?risk_status.halt_reason, "Risk halt, trading halted");
                *status = TradingStatus::Halted;
            }
            *status
        };

        for event in risk_events {
            self.hub.publish(Payload::Risk(event));
        }

        telemetry::set_gauge(GaugeMetric::OpenPositions, account.open_positions as f64);
        telemetry::set_decimal_gauge(GaugeMetric::UnrealizedPnl, account.unrealized_pnl);
        telemetry::set_decimal_gauge(GaugeMetric::RealizedPnl, account.realized_pnl);

        let last_signal = self.signals.lock().await.back().cloned();
        let active_strategies = self.strategies.read().await.clone();
        let regime = self.regime.read().await.clone();
        let errors = self.errors().await;
        let state = TradingState {
            status,
            open_positions: account.open_positions,
            open_orders: account.open_orders,
            total_trades: account.total_trades,
            account,
            risk: risk_status,
            last_signal,
            active_strategies,
            regime,
            errors,
            updated_at: Utc::now(),
        };
        *self.state.write().await = state.clone();
        self.hub.publish(Payload::State(Box::new(state)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Subscription;
    use crate::ledger::OrderSide;
    use crate::signal::Direction;
    use rust_decimal_macros::dec;

    fn config() -> Config {
        let mut config = Config::default();
        config.account.commission_rate = dec!(0);
        config.account.slippage = dec!(0);
        config.risk.max_position_size = dec!(1.0);
        config
    }

    async fn orchestrator(config: &Config) -> (Orchestrator, Subscription) {
        let hub = BroadcastHub::new(1024);
        let sub = hub.subscribe().await.unwrap();
        (Orchestrator::new(config, hub).await, sub)
    }

    fn long_signal() -> Signal {
        Signal::new(
            "ETHUSDT",
            Direction::Long,
            dec!(2000),
            dec!(1960),
            dec!(2100),
            "breakout",
            dec!(1),
        )
    }

    fn drain_kinds(sub: &mut Subscription) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Some(msg) = sub.try_recv() {
            kinds.push(msg.payload.kind());
        }
        kinds
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let (orch, _sub) = orchestrator(&config()).await;
        assert_eq!(orch.status().await, TradingStatus::Stopped);

        assert!(matches!(
            orch.pause().await,
            Err(TradingError::InvalidState(_))
        ));
        assert_eq!(orch.start().await.unwrap(), TradingStatus::Running);
        assert!(orch.start().await.is_err());
        assert_eq!(orch.pause().await.unwrap(), TradingStatus::Paused);
        assert_eq!(orch.resume().await.unwrap(), TradingStatus::Running);
        assert_eq!(orch.stop().await.unwrap(), TradingStatus::Stopped);
        assert!(orch.resume().await.is_err());
    }

    #[tokio::test]
    async fn test_auto_start() {
        let mut cfg = config();
        cfg.orchestrator.auto_start = true;
        let (orch, _sub) = orchestrator(&cfg).await;
        assert_eq!(orch.status().await, TradingStatus::Running);
    }

    #[tokio::test]
    async fn test_signal_ignored_when_not_running() {
        let (orch, mut sub) = orchestrator(&config()).await;
        orch.update_price("ETHUSDT", dec!(2000), Utc::now())
            .await
            .unwrap();

        let outcome = orch.on_signal(long_signal()).await.unwrap();
        assert_eq!(
            outcome,
            SignalOutcome::Ignored {
                status: TradingStatus::Stopped
            }
        );
        assert!(orch.positions().await.is_empty());
        assert_eq!(orch.recent_signals(10).await.len(), 1);

        let _ = orch.hub().subscriber_count().await;
        let kinds = drain_kinds(&mut sub);
        assert!(kinds.contains(&"signal"));
    }

    #[tokio::test]
    async fn test_signal_executes_and_broadcasts() {
        let (orch, mut sub) = orchestrator(&config()).await;
        orch.start().await.unwrap();
        orch.update_price("ETHUSDT", dec!(2000), Utc::now())
            .await
            .unwrap();

        let outcome = orch.on_signal(long_signal()).await.unwrap();
        assert!(matches!(outcome, SignalOutcome::Executed { size, .. } if size == dec!(50)));

        let positions = orch.positions().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, dec!(50));
        assert_eq!(positions[0].stop_loss, Some(dec!(1960)));

        let state = orch.state().await;
        assert_eq!(state.open_positions, 1);
        assert!(state.last_signal.is_some());

        // Second signal for the same symbol hits the per-symbol limit
        let outcome = orch.on_signal(long_signal()).await.unwrap();
        assert!(matches!(outcome, SignalOutcome::Rejected { .. }));

        // Let the dispatch task catch up
        let _ = orch.hub().subscriber_count().await;
        let kinds = drain_kinds(&mut sub);
        for kind in ["price", "signal", "trade", "position", "state"] {
            assert!(kinds.contains(&kind), "missing {} in {:?}", kind, kinds);
        }
    }

    #[tokio::test]
    async fn test_stop_loss_feeds_risk_manager() {
        let (orch, _sub) = orchestrator(&config()).await;
        orch.start().await.unwrap();
        orch.update_price("ETHUSDT", dec!(2000), Utc::now())
            .await
            .unwrap();
        orch.on_signal(long_signal()).await.unwrap();

        let closed = orch
            .update_price("ETHUSDT", dec!(1950), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.realized_pnl(), dec!(-2500));
        assert!(orch.positions().await.is_empty());

        let risk = orch.risk_status().await;
        assert_eq!(risk.consecutive_losses, 1);
        assert_eq!(risk.daily_pnl, dec!(-2500));
    }

    #[tokio::test]
    async fn test_losing_streak_halts_and_reset_resumes() {
        let mut cfg = config();
        cfg.risk.max_consecutive_losses = 2;
        cfg.risk.max_daily_loss_pct = dec!(0.5);
        cfg.risk.max_weekly_loss_pct = dec!(0.5);
        cfg.risk.max_drawdown_pct = dec!(0.5);
        let (orch, _sub) = orchestrator(&cfg).await;
        orch.start().await.unwrap();

        for _ in 0..2 {
            orch.update_price("ETHUSDT", dec!(2000), Utc::now())
                .await
                .unwrap();
            let outcome = orch.on_signal(long_signal()).await.unwrap();
            assert!(matches!(outcome, SignalOutcome::Executed { .. }));
            orch.update_price("ETHUSDT", dec!(1950), Utc::now())
                .await
                .unwrap();
        }

        assert_eq!(orch.status().await, TradingStatus::Halted);
        assert!(orch.risk_status().await.halted);

        orch.update_price("ETHUSDT", dec!(2000), Utc::now())
            .await
            .unwrap();
        let outcome = orch.on_signal(long_signal()).await.unwrap();
        assert_eq!(
            outcome,
            SignalOutcome::Ignored {
                status: TradingStatus::Halted
            }
        );
        assert!(matches!(
            orch.place_order(OrderRequest::market("ETHUSDT", OrderSide::Buy, dec!(1)))
                .await,
            Err(TradingError::RiskRejected(RejectReason::TradingHalted))
        ));
        assert!(orch.start().await.is_err());

        assert_eq!(orch.reset_circuit_breaker().await, TradingStatus::Running);
        let outcome = orch.on_signal(long_signal()).await.unwrap();
        assert!(matches!(outcome, SignalOutcome::Executed { .. }));
    }

    #[tokio::test]
    async fn test_reset_reports_rehalt_while_drawdown_breached() {
        let (orch, _sub) = orchestrator(&config()).await;
        orch.start().await.unwrap();
        orch.update_price("ETHUSDT", dec!(2000), Utc::now())
            .await
            .unwrap();
        orch.place_order(OrderRequest::market("ETHUSDT", OrderSide::Buy, dec!(40)))
            .await
            .unwrap();

        // Equity 60000 against a 100000 peak
        orch.update_price("ETHUSDT", dec!(1000), Utc::now())
            .await
            .unwrap();
        assert_eq!(orch.status().await, TradingStatus::Halted);

        // Peak equity survives the reset, so the breach halts again at once
        assert_eq!(orch.reset_circuit_breaker().await, TradingStatus::Halted);
        assert_eq!(orch.status().await, TradingStatus::Halted);
        assert!(orch.risk_status().await.halted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_exits_recorded_in_ledger_order() {
        let mut cfg = config();
        cfg.risk.max_consecutive_losses = 100;
        cfg.risk.max_daily_loss_pct = dec!(0.5);
        cfg.risk.max_weekly_loss_pct = dec!(0.5);
        cfg.risk.max_drawdown_pct = dec!(0.5);
        let (orch, _sub) = orchestrator(&cfg).await;
        orch.start().await.unwrap();
        let orch = Arc::new(orch);

        let symbols = ["AUSDT", "BUSDT", "CUSDT", "DUSDT"];
        for symbol in symbols {
            orch.update_price(symbol, dec!(100), Utc::now())
                .await
                .unwrap();
            let req = OrderRequest::market(symbol, OrderSide::Buy, dec!(10))
                .with_exits(Some(dec!(90)), Some(dec!(110)));
            orch.place_order(req).await.unwrap();
        }

        // Two stop-outs and two targets race each other
        let exits = [dec!(80), dec!(120), dec!(85), dec!(115)];
        let handles: Vec<_> = symbols
            .into_iter()
            .zip(exits)
            .map(|(symbol, price)| {
                let orch = Arc::clone(&orch);
                tokio::spawn(async move { orch.update_price(symbol, price, Utc::now()).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }

        // The streak must match the ledger's own close order
        let closes: Vec<Decimal> = orch
            .trades(None)
            .await
            .into_iter()
            .map(|t| t.realized_pnl)
            .filter(|pnl| !pnl.is_zero())
            .collect();
        assert_eq!(closes.len(), 4);
        let trailing_losses = closes
            .iter()
            .rev()
            .take_while(|pnl| **pnl < dec!(0))
            .count() as u32;

        let risk = orch.risk_status().await;
        assert_eq!(risk.total_trades, 4);
        assert_eq!(risk.consecutive_losses, trailing_losses);
    }

    /// Engine whose every fill breaks a ledger invariant
    struct BrokenLedger;

    #[async_trait::async_trait]
    impl ExecutionEngine for BrokenLedger {
        async fn place_order(&self, _request: OrderRequest) -> Result<PlaceOrderResult> {
            Err(TradingError::InvariantViolation(
                "position quantity went negative".into(),
            ))
        }

        async fn cancel_order(&self, id: OrderId) -> Result<Order> {
            Err(TradingError::NotFound(id.to_string()))
        }

        async fn close_position(&self, id: PositionId) -> Result<PlaceOrderResult> {
            Err(TradingError::NotFound(id.to_string()))
        }

        async fn update_stop_loss(&self, id: PositionId, _price: Decimal) -> Result<Position> {
            Err(TradingError::NotFound(id.to_string()))
        }

        async fn update_take_profit(&self, id: PositionId, _price: Decimal) -> Result<Position> {
            Err(TradingError::NotFound(id.to_string()))
        }

        async fn update_price(
            &self,
            _symbol: &str,
            _price: Decimal,
            _timestamp: DateTime<Utc>,
        ) -> Result<Option<PlaceOrderResult>> {
            Ok(None)
        }

        async fn positions(&self) -> Vec<Position> {
            Vec::new()
        }

        async fn open_orders(&self) -> Vec<Order> {
            Vec::new()
        }

        async fn trades(&self, _limit: Option<usize>) -> Vec<Trade> {
            Vec::new()
        }

        async fn account_summary(&self) -> AccountSummary {
            AccountSummary {
                quote_asset: "USDT".into(),
                initial_balance: dec!(100000),
                free_balance: dec!(100000),
                equity: dec!(100000),
                unrealized_pnl: dec!(0),
                realized_pnl: dec!(0),
                total_commission: dec!(0),
                open_positions: 0,
                open_orders: 0,
                total_trades: 0,
                open_symbols: Vec::new(),
                timestamp: Utc::now(),
            }
        }
    }

    #[tokio::test]
    async fn test_invariant_violation_halts_account() {
        let cfg = config();
        let (_tx, events) = mpsc::unbounded_channel();
        let risk = RiskManager::new(cfg.risk.clone(), dec!(100000));
        let orch = Orchestrator::with_engine(
            Arc::new(BrokenLedger),
            events,
            risk,
            cfg.orchestrator.clone(),
            BroadcastHub::new(64),
        )
        .await;
        orch.start().await.unwrap();

        let err = orch.on_signal(long_signal()).await.unwrap_err();
        assert!(matches!(err, TradingError::InvariantViolation(_)));
        assert_eq!(orch.status().await, TradingStatus::Halted);

        let risk = orch.risk_status().await;
        assert!(risk.halted);
        assert!(matches!(
            risk.halt_reason,
            Some(HaltReason::InvariantViolation(_))
        ));
        assert!(risk.halted_until.is_none());
        assert_eq!(orch.errors().await.len(), 1);

        // Later signals are not evaluated
        let outcome = orch.on_signal(long_signal()).await.unwrap();
        assert_eq!(
            outcome,
            SignalOutcome::Ignored {
                status: TradingStatus::Halted
            }
        );
    }

    #[tokio::test]
    async fn test_placement_failure_is_reported() {
        let (orch, _sub) = orchestrator(&config()).await;
        orch.start().await.unwrap();

        // No price yet for the symbol
        let outcome = orch.on_signal(long_signal()).await.unwrap();
        assert!(matches!(outcome, SignalOutcome::Failed { .. }));
        let errors = orch.errors().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source, "signal");
        assert_eq!(orch.status().await, TradingStatus::Running);
    }

    #[tokio::test]
    async fn test_errors_are_bounded() {
        let mut cfg = config();
        cfg.orchestrator.max_errors = 3;
        let (orch, _sub) = orchestrator(&cfg).await;
        for n in 0..5 {
            orch.report_error("strategy", format!("error {}", n)).await;
        }
        let errors = orch.errors().await;
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].message, "error 2");
        assert_eq!(orch.state().await.errors.len(), 3);
    }

    #[tokio::test]
    async fn test_dashboard_setters() {
        let (orch, _sub) = orchestrator(&config()).await;
        orch.set_active_strategies(vec!["breakout".into(), "mean_reversion".into()])
            .await;
        orch.set_regime(Some("trending".into())).await;

        let state = orch.state().await;
        assert_eq!(state.active_strategies.len(), 2);
        assert_eq!(state.regime.as_deref(), Some("trending"));
    }

    #[tokio::test]
    async fn test_run_consumes_market_events() {
        let mut cfg = config();
        cfg.orchestrator.auto_start = true;
        let (orch, _sub) = orchestrator(&cfg).await;
        let orch = Arc::new(orch);

        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(Arc::clone(&orch).run(rx));

        tx.send(MarketEvent::Price(PriceTick {
            symbol: "ETHUSDT".into(),
            price: dec!(2000),
            timestamp: Utc::now(),
        }))
        .await
        .unwrap();
        tx.send(MarketEvent::Signal(long_signal())).await.unwrap();
        // Bad price is logged, not fatal
        tx.send(MarketEvent::Price(PriceTick {
            symbol: "ETHUSDT".into(),
            price: dec!(-1),
            timestamp: Utc::now(),
        }))
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(orch.positions().await.len(), 1);
        assert_eq!(orch.errors().await.len(), 1);
    }
}
