//! End-to-end: config file + replayed event stream through the orchestrator

use std::io::Write;
use std::sync::Arc;

use paper_desk::broadcast::BroadcastHub;
use paper_desk::config::Config;
use paper_desk::feed::{MarketFeed, ReplayFeed};
use paper_desk::orchestrator::{Orchestrator, TradingStatus};
use rust_decimal_macros::dec;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
    [account]
    initial_balance = "100000"
    commission_rate = "0"
    slippage = "0"

    [risk]
    max_position_size = "1.0"

    [orchestrator]
    auto_start = true

    [broadcast]
    queue_depth = 64
"#;

const EVENTS: &str = r#"
# warm-up price
{"kind":"price","symbol":"ETHUSDT","price":"2000","timestamp":"2024-01-01T00:00:00Z"}
{"kind":"signal","symbol":"ETHUSDT","direction":"long","entry_price":"2000","stop_loss":"1960","take_profit":"2100","strategy_tag":"breakout","strength":"1","timestamp":"2024-01-01T00:00:01Z"}
not json at all
{"kind":"candle","symbol":"ETHUSDT","interval":"1m","open":"2000","high":"2010","low":"1990","close":"2005","volume":"12.5","open_time":"2024-01-01T00:00:00Z","close_time":"2024-01-01T00:01:00Z"}
{"kind":"price","symbol":"ETHUSDT","price":"2100","timestamp":"2024-01-01T00:02:00Z"}
"#;

fn temp_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_example_config_loads() {
    let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml.example")).unwrap();
    assert_eq!(config.account.quote_asset, "USDT");
}

#[tokio::test]
async fn test_replay_take_profit_round_trip() {
    let config_file = temp_file(CONFIG);
    let events_file = temp_file(EVENTS);
    let config = Config::load(config_file.path()).unwrap();

    let hub = BroadcastHub::from_config(&config.broadcast);
    let orch = Arc::new(Orchestrator::new(&config, hub).await);
    assert_eq!(orch.status().await, TradingStatus::Running);

    let rx = ReplayFeed::new(events_file.path())
        .subscribe()
        .await
        .unwrap();
    Arc::clone(&orch).run(rx).await;

    // Entered 50 @ 2000, take profit at 2100
    let summary = orch.account_summary().await;
    assert_eq!(summary.open_positions, 0);
    assert_eq!(summary.realized_pnl, dec!(5000));
    assert_eq!(summary.equity, dec!(105000));
    assert_eq!(orch.trades(None).await.len(), 2);

    let signals = orch.recent_signals(10).await;
    assert_eq!(signals.len(), 1);

    let risk = orch.risk_status().await;
    assert_eq!(risk.peak_equity, dec!(105000));
    assert_eq!(risk.consecutive_losses, 0);
}
