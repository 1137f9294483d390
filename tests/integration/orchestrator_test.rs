//! Orchestrator flow: signal -> risk -> ledger -> events -> subscribers

use std::sync::Arc;

use chrono::Utc;
use paper_desk::broadcast::{BroadcastHub, Payload};
use paper_desk::config::Config;
use paper_desk::orchestrator::{Orchestrator, SignalOutcome, TradingStatus};
use paper_desk::risk::{HaltReason, RiskEventKind};
use paper_desk::signal::{Direction, Signal};
use rust_decimal_macros::dec;

fn config() -> Config {
    let mut config = Config::default();
    config.account.commission_rate = dec!(0);
    config.account.slippage = dec!(0);
    config.risk.max_position_size = dec!(1.0);
    config.orchestrator.auto_start = true;
    config
}

fn eth_long() -> Signal {
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

#[tokio::test]
async fn test_sized_entry_then_stop_out() {
    let hub = BroadcastHub::new(1024);
    let orch = Orchestrator::new(&config(), hub).await;

    orch.update_price("ETHUSDT", dec!(2000), Utc::now())
        .await
        .unwrap();
    let outcome = orch.on_signal(eth_long()).await.unwrap();
    match outcome {
        SignalOutcome::Executed { size, .. } => assert_eq!(size, dec!(50)),
        other => panic!("unexpected outcome {:?}", other),
    }

    let closed = orch
        .update_price("ETHUSDT", dec!(1950), Utc::now())
        .await
        .unwrap()
        .expect("stop should close the position");
    assert_eq!(closed.trades[0].price, dec!(1950));
    assert_eq!(closed.realized_pnl(), dec!(-2500));

    let summary = orch.account_summary().await;
    assert_eq!(summary.equity, dec!(97500));
    assert_eq!(summary.realized_pnl, dec!(-2500));

    let info = orch.drawdown_info().await;
    assert_eq!(info.current_drawdown, dec!(0.025));
}

#[tokio::test]
async fn test_losing_streak_halts_before_sixth_signal() {
    let mut cfg = config();
    // Small risk so the streak, not the loss windows, trips first
    cfg.risk.max_risk_per_trade = dec!(0.001);
    let hub = BroadcastHub::new(4096);
    let mut sub = hub.subscribe().await.unwrap();
    let orch = Orchestrator::new(&cfg, hub).await;

    for _ in 0..5 {
        orch.update_price("ETHUSDT", dec!(2000), Utc::now())
            .await
            .unwrap();
        let outcome = orch.on_signal(eth_long()).await.unwrap();
        assert!(matches!(outcome, SignalOutcome::Executed { .. }));
        orch.update_price("ETHUSDT", dec!(1950), Utc::now())
            .await
            .unwrap();
    }

    assert_eq!(orch.status().await, TradingStatus::Halted);
    let risk = orch.risk_status().await;
    assert_eq!(risk.halt_reason, Some(HaltReason::ConsecutiveLosses(5)));

    orch.update_price("ETHUSDT", dec!(2000), Utc::now())
        .await
        .unwrap();
    let sixth = orch.on_signal(eth_long()).await.unwrap();
    assert!(matches!(sixth, SignalOutcome::Ignored { .. }));
    assert!(orch.positions().await.is_empty());

    let events = orch.recent_risk_events(10).await;
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, RiskEventKind::Halted { .. })));

    // Subscribers saw the halt as both a risk message and a halted state
    let _ = orch.hub().subscriber_count().await;
    let mut saw_risk = false;
    let mut saw_halted_state = false;
    while let Some(msg) = sub.try_recv() {
        match &msg.payload {
            Payload::Risk(event) => {
                saw_risk |= matches!(event.kind, RiskEventKind::Halted { .. });
            }
            Payload::State(state) => {
                saw_halted_state |= state.status == TradingStatus::Halted;
            }
            _ => {}
        }
    }
    assert!(saw_risk);
    assert!(saw_halted_state);
}

#[tokio::test]
async fn test_concurrent_signals_respect_position_limits() {
    let mut cfg = config();
    cfg.risk.max_position_size = dec!(0.1);
    let hub = BroadcastHub::new(1024);
    let orch = Arc::new(Orchestrator::new(&cfg, hub).await);
    orch.update_price("ETHUSDT", dec!(2000), Utc::now())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orch = Arc::clone(&orch);
        handles.push(tokio::spawn(async move { orch.on_signal(eth_long()).await }));
    }
    let mut executed = 0;
    for handle in handles {
        if let SignalOutcome::Executed { .. } = handle.await.unwrap().unwrap() {
            executed += 1;
        }
    }

    // One entry per symbol, however the signals interleave
    assert_eq!(executed, 1);
    assert_eq!(orch.positions().await.len(), 1);
}

#[tokio::test]
async fn test_pause_blocks_signals_but_not_exits() {
    let hub = BroadcastHub::new(1024);
    let orch = Orchestrator::new(&config(), hub).await;
    orch.update_price("ETHUSDT", dec!(2000), Utc::now())
        .await
        .unwrap();
    orch.on_signal(eth_long()).await.unwrap();

    orch.pause().await.unwrap();
    let outcome = orch.on_signal(eth_long()).await.unwrap();
    assert_eq!(
        outcome,
        SignalOutcome::Ignored {
            status: TradingStatus::Paused
        }
    );

    // Take profit still fires while paused
    let closed = orch
        .update_price("ETHUSDT", dec!(2100), Utc::now())
        .await
        .unwrap();
    assert!(closed.is_some());
    assert_eq!(orch.account_summary().await.realized_pnl, dec!(5000));
    assert_eq!(orch.status().await, TradingStatus::Paused);
}
