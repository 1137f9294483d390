//! Run command implementation

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use rust_decimal::Decimal;

use crate::broadcast::BroadcastHub;
use crate::config::Config;
use crate::feed::{MarketFeed, ReplayFeed};
use crate::orchestrator::{Orchestrator, TradingStatus};

/// Summary output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON-lines file of market events (price, candle, signal)
    #[arg(long)]
    pub events: PathBuf,

    /// Override the configured initial balance
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Print every broadcast message as a JSON line
    #[arg(long)]
    pub stream: bool,

    /// Summary format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl RunArgs {
    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        if let Some(capital) = self.capital {
            config.account.initial_balance = capital;
        }
        config.validate()?;

        let hub = BroadcastHub::from_config(&config.broadcast);
        let orchestrator = Arc::new(Orchestrator::new(&config, hub.clone()).await);

        let printer = if self.stream {
            let mut subscription = hub.subscribe().await?;
            Some(tokio::spawn(async move {
                while let Some(message) = subscription.recv().await {
                    match message.to_json() {
                        Ok(line) => println!("{}", line),
                        Err(e) => tracing::warn!(error = %e, "Failed to encode message"),
                    }
                }
            }))
        } else {
            None
        };

        if orchestrator.status().await == TradingStatus::Stopped {
            orchestrator.start().await?;
        }

        let feed = ReplayFeed::new(&self.events);
        let rx = feed.subscribe().await?;
        Arc::clone(&orchestrator).run(rx).await;

        if let Some(printer) = printer {
            let _ = hub.subscriber_count().await;
            printer.abort();
        }

        let account = orchestrator.account_summary().await;
        let risk = orchestrator.risk_status().await;
        let status = orchestrator.status().await;

        match self.format {
            OutputFormat::Json => {
                let summary = serde_json::json!({
                    "status": status,
                    "account": account,
                    "risk": risk,
                    "positions": orchestrator.positions().await,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            OutputFormat::Table => {
                println!("Replay finished ({})", status);
                println!("  Equity:        {} {}", account.equity, account.quote_asset);
                println!("  Free balance:  {}", account.free_balance);
                println!("  Realized P&L:  {}", account.realized_pnl);
                println!("  Unrealized:    {}", account.unrealized_pnl);
                println!("  Commission:    {}", account.total_commission);
                println!("  Trades:        {}", account.total_trades);
                println!("  Open:          {}", account.open_positions);
                println!(
                    "  Drawdown:      {}% (max {}%)",
                    (risk.current_drawdown * Decimal::ONE_HUNDRED).round_dp(2),
                    (risk.max_drawdown * Decimal::ONE_HUNDRED).round_dp(2)
                );
                if let Some(reason) = &risk.halt_reason {
                    println!("  Halted:        {}", reason);
                }
            }
        }

        Ok(())
    }
}
