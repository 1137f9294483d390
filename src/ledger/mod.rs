//! Account ledger
//!
//! Holds balances, open positions, orders and trade history for one account
//! and applies fills atomically. `PaperLedger` is the simulated engine; a live
//! order router implements the same `ExecutionEngine` trait.

mod book;
mod paper;
mod types;

pub use paper::PaperLedger;
pub use types::{
    AccountSummary, LedgerEvent, Order, OrderId, OrderRequest, OrderSide, OrderStatus, OrderType,
    PlaceOrderResult, Position, PositionEventKind, PositionId, PositionSide, Trade, TradeId,
    TriggerKind,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::Result;

/// Trait for execution engine implementations
///
/// Every method returns owned snapshots; callers never see live state.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Place and (in simulation) immediately fill an order
    async fn place_order(&self, request: OrderRequest) -> Result<PlaceOrderResult>;
    /// Cancel a pending or open order
    async fn cancel_order(&self, id: OrderId) -> Result<Order>;
    /// Flatten a position at the current reference price
    async fn close_position(&self, id: PositionId) -> Result<PlaceOrderResult>;
    /// Move a position's stop loss
    async fn update_stop_loss(&self, id: PositionId, price: Decimal) -> Result<Position>;
    /// Move a position's take profit
    async fn update_take_profit(&self, id: PositionId, price: Decimal) -> Result<Position>;
    /// Record a reference price, mark the symbol's position and run its exits
    async fn update_price(
        &self,
        symbol: &str,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<PlaceOrderResult>>;
    /// Open positions ordered by id
    async fn positions(&self) -> Vec<Position>;
    /// Orders still pending or open
    async fn open_orders(&self) -> Vec<Order>;
    /// Most recent trades, oldest first
    async fn trades(&self, limit: Option<usize>) -> Vec<Trade>;
    /// Balance, equity and count summary
    async fn account_summary(&self) -> AccountSummary;
}
