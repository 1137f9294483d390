//! Configuration types for paper-desk

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Simulated account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Starting free balance in the quote asset
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,

    /// Quote asset all balances are held in
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// Commission as a fraction of notional (e.g., 0.001 = 10 bps)
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,

    /// Market order slippage as a fraction of the reference price
    #[serde(default = "default_slippage")]
    pub slippage: Decimal,
}

fn default_initial_balance() -> Decimal {
    Decimal::new(100_000, 0)
}
fn default_quote_asset() -> String {
    "USDT".to_string()
}
fn default_commission_rate() -> Decimal {
    Decimal::new(1, 3) // 0.001 = 0.1%
}
fn default_slippage() -> Decimal {
    Decimal::new(5, 4) // 0.0005 = 5 bps
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            quote_asset: default_quote_asset(),
            commission_rate: default_commission_rate(),
            slippage: default_slippage(),
        }
    }
}

/// Primary sizing strategy used by the risk manager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    /// Fixed fraction of equity at risk between entry and stop
    #[default]
    Risk,
    /// Stop derived from ATR, then fixed-risk sizing
    Atr,
    /// Half-Kelly fraction from recent trade statistics
    Kelly,
    /// Optimal-f fraction from recent trade extremes
    OptimalF,
}

/// Risk limits and sizing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fraction of equity risked per trade (0.02 = 2%)
    #[serde(default = "default_max_risk_per_trade")]
    pub max_risk_per_trade: Decimal,

    /// Maximum position value as a fraction of equity
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,

    /// Absolute maximum position value in the quote asset
    #[serde(default = "default_max_position_value")]
    pub max_position_value: Decimal,

    /// Maximum position value divided by equity
    #[serde(default = "default_max_leverage")]
    pub max_leverage: Decimal,

    /// Minimum reward/risk ratio a signal must offer
    #[serde(default = "default_min_risk_reward")]
    pub min_risk_reward: Decimal,

    /// Maximum simultaneously open positions
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,

    /// Maximum entries per symbol
    #[serde(default = "default_max_positions_per_symbol")]
    pub max_positions_per_symbol: usize,

    /// Drawdown from peak equity that halts trading
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,

    /// Daily realized loss (fraction of day-start equity) that halts trading
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: Decimal,

    /// Weekly realized loss (fraction of week-start equity) that halts trading
    #[serde(default = "default_max_weekly_loss_pct")]
    pub max_weekly_loss_pct: Decimal,

    /// Fraction of any limit at which the manager enters the warning state
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: Decimal,

    /// Enable the consecutive-loss circuit breaker
    #[serde(default = "default_true")]
    pub circuit_breaker_enabled: bool,

    /// Consecutive losing trades that trip the breaker
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,

    /// How long a halt lasts before trading may resume on its own
    #[serde(default = "default_halt_duration_secs")]
    pub halt_duration_secs: u64,

    /// Primary sizing method
    #[serde(default)]
    pub sizing_method: SizingMethod,

    /// ATR multiple used to place the stop for ATR sizing
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: Decimal,

    /// Fallback equity fraction for optimal-f without history
    #[serde(default = "default_fraction")]
    pub default_fraction: Decimal,

    /// Size reduction per unit of positive correlation
    #[serde(default = "default_correlation_penalty")]
    pub correlation_penalty: Decimal,

    /// Quantity increment orders are rounded down to (0 disables)
    #[serde(default)]
    pub step_size: Decimal,

    /// Trade P&L samples kept for Kelly and optimal-f
    #[serde(default = "default_trade_history")]
    pub trade_history: usize,
}

fn default_true() -> bool {
    true
}
fn default_max_risk_per_trade() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_max_position_size() -> Decimal {
    Decimal::new(25, 2) // 0.25
}
fn default_max_position_value() -> Decimal {
    Decimal::new(100_000, 0)
}
fn default_max_leverage() -> Decimal {
    Decimal::new(3, 0)
}
fn default_min_risk_reward() -> Decimal {
    Decimal::new(15, 1) // 1.5
}
fn default_max_open_positions() -> usize {
    5
}
fn default_max_positions_per_symbol() -> usize {
    1
}
fn default_max_drawdown_pct() -> Decimal {
    Decimal::new(15, 2) // 0.15
}
fn default_max_daily_loss_pct() -> Decimal {
    Decimal::new(5, 2) // 0.05
}
fn default_max_weekly_loss_pct() -> Decimal {
    Decimal::new(10, 2) // 0.10
}
fn default_warning_threshold() -> Decimal {
    Decimal::new(8, 1) // 0.8
}
fn default_max_consecutive_losses() -> u32 {
    5
}
fn default_halt_duration_secs() -> u64 {
    3600
}
fn default_atr_multiplier() -> Decimal {
    Decimal::new(2, 0)
}
fn default_fraction() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_correlation_penalty() -> Decimal {
    Decimal::new(5, 1) // 0.5
}
fn default_trade_history() -> usize {
    200
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade: default_max_risk_per_trade(),
            max_position_size: default_max_position_size(),
            max_position_value: default_max_position_value(),
            max_leverage: default_max_leverage(),
            min_risk_reward: default_min_risk_reward(),
            max_open_positions: default_max_open_positions(),
            max_positions_per_symbol: default_max_positions_per_symbol(),
            max_drawdown_pct: default_max_drawdown_pct(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_weekly_loss_pct: default_max_weekly_loss_pct(),
            warning_threshold: default_warning_threshold(),
            circuit_breaker_enabled: true,
            max_consecutive_losses: default_max_consecutive_losses(),
            halt_duration_secs: default_halt_duration_secs(),
            sizing_method: SizingMethod::Risk,
            atr_multiplier: default_atr_multiplier(),
            default_fraction: default_fraction(),
            correlation_penalty: default_correlation_penalty(),
            step_size: Decimal::ZERO,
            trade_history: default_trade_history(),
        }
    }
}

/// Orchestrator bookkeeping limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Signals kept in the audit log
    #[serde(default = "default_signal_history")]
    pub signal_history: usize,

    /// System errors kept in the trading state
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,

    /// Start in the running state instead of stopped
    #[serde(default)]
    pub auto_start: bool,
}

fn default_signal_history() -> usize {
    500
}
fn default_max_errors() -> usize {
    50
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            signal_history: default_signal_history(),
            max_errors: default_max_errors(),
            auto_start: false,
        }
    }
}

/// Broadcast hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Per-subscriber queue depth
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_queue_depth() -> usize {
    256
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Prometheus listener port; metrics are not exported when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    #[serde(default)]
    pub json_logs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: None,
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the core cannot operate with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.account.initial_balance < Decimal::ZERO {
            anyhow::bail!("account.initial_balance must not be negative");
        }
        if self.account.commission_rate < Decimal::ZERO || self.account.slippage < Decimal::ZERO {
            anyhow::bail!("account.commission_rate and account.slippage must not be negative");
        }
        if self.risk.max_risk_per_trade <= Decimal::ZERO {
            anyhow::bail!("risk.max_risk_per_trade must be positive");
        }
        if self.broadcast.queue_depth == 0 {
            anyhow::bail!("broadcast.queue_depth must be at least 1");
        }
        Ok(())
    }
}
