//! Market data input
//!
//! Price ticks, candle closes and strategy signals arrive as `MarketEvent`s

mod replay;
mod types;

pub use replay::ReplayFeed;
pub use types::{Candle, MarketEvent, PriceTick};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Trait for market event sources
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Subscribe to market events
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<MarketEvent>>;
}
