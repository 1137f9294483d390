//! Simulated ledger with immediate fills

use super::book::Book;
use super::{
    AccountSummary, ExecutionEngine, LedgerEvent, Order, OrderId, OrderRequest, PlaceOrderResult,
    Position, PositionId, Trade, TriggerKind,
};
use crate::config::AccountConfig;
use crate::error::{Result, TradingError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, RwLock};

/// Paper trading ledger for one account
///
/// All mutation goes through a single write lock over the whole book;
/// queries take the read lock.
pub struct PaperLedger {
    book: RwLock<Book>,
}

impl PaperLedger {
    /// Create a ledger that does not publish events
    pub fn new(config: AccountConfig) -> Self {
        Self {
            book: RwLock::new(Book::new(config, None)),
        }
    }

    /// Create a ledger and the receiving end of its event queue
    pub fn with_events(config: AccountConfig) -> (Self, mpsc::UnboundedReceiver<LedgerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ledger = Self {
            book: RwLock::new(Book::new(config, Some(tx))),
        };
        (ledger, rx)
    }

    /// Free balance plus the marked value of open positions
    pub async fn equity(&self) -> Decimal {
        self.book.read().await.equity()
    }

    /// Free balance of an asset
    pub async fn balance(&self, asset: &str) -> Decimal {
        self.book.read().await.balance(asset)
    }

    /// Last reference price seen for a symbol
    pub async fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.book.read().await.last_price(symbol)
    }

    /// Look up an open position
    pub async fn position(&self, id: PositionId) -> Option<Position> {
        self.book.read().await.position(id).cloned()
    }

    /// Every order the ledger has accepted, oldest first
    pub async fn orders(&self) -> Vec<Order> {
        self.book.read().await.orders()
    }

    async fn set_exit(&self, id: PositionId, kind: TriggerKind, price: Decimal) -> Result<Position> {
        let mut book = self.book.write().await;
        let position = book.set_exit(id, kind, price, Utc::now())?;
        tracing::info!(position_id = id, %kind, %price, "Exit updated");
        Ok(position)
    }
}

#[async_trait]
impl ExecutionEngine for PaperLedger {
    async fn place_order(&self, request: OrderRequest) -> Result<PlaceOrderResult> {
        let mut book = self.book.write().await;
        let result = book.place(&request, Utc::now());
        match &result {
            Ok(r) => {
                crate::telemetry::record_fill(&r.order);
                tracing::info!(
                    order_id = %r.order.id,
                    symbol = %r.order.symbol,
                    side = ?r.order.side,
                    quantity = %r.order.filled_quantity,
                    price = %r.order.avg_fill_price,
                    "Paper order filled"
                );
            }
            Err(e) => {
                tracing::warn!(symbol = %request.symbol, error = %e, "Order rejected");
            }
        }
        result
    }

    async fn cancel_order(&self, id: OrderId) -> Result<Order> {
        let mut book = self.book.write().await;
        let order = book.cancel(id)?;
        tracing::info!(?id, "Paper order cancelled");
        Ok(order)
    }

    async fn close_position(&self, id: PositionId) -> Result<PlaceOrderResult> {
        let mut book = self.book.write().await;
        let request = book.close_request(id)?;
        let result = book.place(&request, Utc::now())?;
        crate::telemetry::record_fill(&result.order);
        tracing::info!(position_id = id, realized = %result.realized_pnl(), "Position closed by request");
        Ok(result)
    }

    async fn update_stop_loss(&self, id: PositionId, price: Decimal) -> Result<Position> {
        self.set_exit(id, TriggerKind::StopLoss, price).await
    }

    async fn update_take_profit(&self, id: PositionId, price: Decimal) -> Result<Position> {
        self.set_exit(id, TriggerKind::TakeProfit, price).await
    }

    async fn update_price(
        &self,
        symbol: &str,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<PlaceOrderResult>> {
        if price <= Decimal::ZERO {
            return Err(TradingError::InvalidInput(format!(
                "price for {} must be positive, got {}",
                symbol, price
            )));
        }

        let trigger = {
            let mut book = self.book.write().await;
            book.set_price(symbol, price, timestamp);
            book.mark(symbol, price, timestamp)
        };
        let Some(trigger) = trigger else {
            return Ok(None);
        };
        tracing::debug!(
            position_id = trigger.position_id,
            kind = %trigger.kind,
            price = %trigger.price,
            "Exit crossed"
        );

        // The lock was released; the close re-checks the position it finds
        let mut book = self.book.write().await;
        let result = book.execute_trigger(&trigger, timestamp)?;
        if let Some(r) = &result {
            crate::telemetry::record_fill(&r.order);
        }
        Ok(result)
    }

    async fn positions(&self) -> Vec<Position> {
        self.book.read().await.positions()
    }

    async fn open_orders(&self) -> Vec<Order> {
        self.book.read().await.open_orders()
    }

    async fn trades(&self, limit: Option<usize>) -> Vec<Trade> {
        self.book.read().await.trades(limit)
    }

    async fn account_summary(&self) -> AccountSummary {
        self.book.read().await.summary(Utc::now())
    }
}
