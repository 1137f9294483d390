//! Market data types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::signal::Signal;

/// A single reference price for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Reference price
    pub price: Decimal,
    /// Exchange timestamp
    pub timestamp: DateTime<Utc>,
}

/// A closed OHLCV candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Trading symbol
    pub symbol: String,
    /// Candle interval (e.g., "1m", "1h")
    pub interval: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    /// Candle open time
    pub open_time: DateTime<Utc>,
    /// Candle close time
    pub close_time: DateTime<Utc>,
}

/// Anything the market-data and strategy layers push into the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MarketEvent {
    /// Reference price update
    Price(PriceTick),
    /// Candle close
    Candle(Candle),
    /// Strategy signal
    Signal(Signal),
}
