//! Ledger types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TradingError};
use crate::signal::Direction;

/// Order identifier
pub type OrderId = Uuid;

/// Trade identifier
pub type TradeId = Uuid;

/// Position identifier, monotonic per account
pub type PositionId = u64;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The side that offsets this one
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Side that opens a position in the given direction
    pub fn entering(direction: Direction) -> Self {
        match direction {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Fills at the reference price adjusted for slippage
    Market,
    /// Fills at the limit price
    Limit,
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    /// Whether the order can still be canceled or filled
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Open)
    }
}

/// Side of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Position side created by a fill on the given order side
    pub fn from_order_side(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }

    /// Order side that increases this position
    pub fn entry_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// +1 for long, -1 for short
    pub fn sign(self) -> Decimal {
        match self {
            PositionSide::Long => Decimal::ONE,
            PositionSide::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Caller-supplied order parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Required for limit orders
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    /// Stop loss applied to the resulting position
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    /// Take profit applied to the resulting position
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    #[serde(default)]
    pub strategy_tag: String,
    /// Caller's own reference for the order
    #[serde(default)]
    pub client_id: Option<String>,
}

impl OrderRequest {
    /// Create a market order request
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_loss: None,
            take_profit: None,
            strategy_tag: String::new(),
            client_id: None,
        }
    }

    /// Create a limit order request
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Attach protective stop and target prices
    pub fn with_exits(mut self, stop_loss: Option<Decimal>, take_profit: Option<Decimal>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    /// Set the strategy tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.strategy_tag = tag.into();
        self
    }

    /// Set the client reference
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Check the request is well-formed
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(TradingError::InvalidInput("symbol is empty".into()));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(TradingError::InvalidInput(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.order_type == OrderType::Limit {
            match self.limit_price {
                Some(p) if p > Decimal::ZERO => {}
                _ => {
                    return Err(TradingError::InvalidInput(
                        "limit order requires a positive limit price".into(),
                    ))
                }
            }
        }
        for (name, value) in [("stop_loss", self.stop_loss), ("take_profit", self.take_profit)] {
            if matches!(value, Some(p) if p <= Decimal::ZERO) {
                return Err(TradingError::InvalidInput(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}

/// An order known to the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub strategy_tag: String,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Decimal,
    pub commission: Decimal,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a pending order from a request
    pub fn from_request(request: &OrderRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: request.client_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            limit_price: request.limit_price,
            strategy_tag: request.strategy_tag.clone(),
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            commission: Decimal::ZERO,
            created_at: now,
            filled_at: None,
        }
    }
}

/// What crossed on a price update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    StopLoss,
    TakeProfit,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::StopLoss => f.write_str("stop_loss"),
            TriggerKind::TakeProfit => f.write_str("take_profit"),
        }
    }
}

/// An open position, one per symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub side: PositionSide,
    /// Always positive while the position is open
    pub quantity: Decimal,
    /// Volume-weighted average entry
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    /// Unrealized P&L as a percentage of cost basis
    pub unrealized_pnl_pct: Decimal,
    pub strategy_tag: String,
    pub open_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Orders that built this position
    pub order_ids: Vec<OrderId>,
}

impl Position {
    /// P&L of the full quantity at a price
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.quantity * self.side.sign()
    }

    /// Entry value, negative for shorts
    pub fn signed_cost_basis(&self) -> Decimal {
        self.entry_price * self.quantity * self.side.sign()
    }

    /// Mark the position to a new price
    pub fn mark(&mut self, price: Decimal, now: DateTime<Utc>) {
        self.current_price = price;
        self.unrealized_pnl = self.pnl_at(price);
        let basis = self.entry_price * self.quantity;
        self.unrealized_pnl_pct = if basis.is_zero() {
            Decimal::ZERO
        } else {
            self.unrealized_pnl / basis * Decimal::ONE_HUNDRED
        };
        self.updated_at = now;
    }

    /// Which exit, if any, the price has crossed
    pub fn trigger_at(&self, price: Decimal) -> Option<TriggerKind> {
        let (stop_hit, target_hit) = match self.side {
            PositionSide::Long => (
                self.stop_loss.is_some_and(|s| price <= s),
                self.take_profit.is_some_and(|t| price >= t),
            ),
            PositionSide::Short => (
                self.stop_loss.is_some_and(|s| price >= s),
                self.take_profit.is_some_and(|t| price <= t),
            ),
        };
        if stop_hit {
            Some(TriggerKind::StopLoss)
        } else if target_hit {
            Some(TriggerKind::TakeProfit)
        } else {
            None
        }
    }
}

/// An immutable execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub order_id: OrderId,
    pub position_id: Option<PositionId>,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    /// Gross P&L realized by this execution; zero for entries
    pub realized_pnl: Decimal,
    pub strategy_tag: String,
    pub executed_at: DateTime<Utc>,
}

/// Outcome of a successful order placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderResult {
    pub order: Order,
    /// One trade, or two when the fill closed and flipped a position
    pub trades: Vec<Trade>,
    /// Resulting open position for the symbol, if any
    pub position: Option<Position>,
}

impl PlaceOrderResult {
    /// Total gross P&L realized by the fill
    pub fn realized_pnl(&self) -> Decimal {
        self.trades.iter().map(|t| t.realized_pnl).sum()
    }
}

/// Read-only summary of one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub quote_asset: String,
    pub initial_balance: Decimal,
    pub free_balance: Decimal,
    pub equity: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub total_commission: Decimal,
    pub open_positions: usize,
    pub open_orders: usize,
    pub total_trades: usize,
    /// Symbols that currently hold a position
    pub open_symbols: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl AccountSummary {
    /// Whether a position is open for the symbol
    pub fn has_position(&self, symbol: &str) -> bool {
        self.open_symbols.iter().any(|s| s == symbol)
    }
}

/// How a position changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionEventKind {
    Opened,
    Increased,
    Reduced,
    Closed,
    /// Stop loss or take profit moved
    Modified,
}

impl PositionEventKind {
    /// Whether the change realized P&L
    pub fn realizes_pnl(self) -> bool {
        matches!(self, PositionEventKind::Reduced | PositionEventKind::Closed)
    }
}

/// Events pushed by the ledger in mutation order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// An order filled completely
    OrderFilled { order: Order },
    /// An order was canceled
    OrderCanceled { order: Order },
    /// A position changed; `trade` is set when a fill caused it
    Position {
        kind: PositionEventKind,
        position: Position,
        trade: Option<Trade>,
    },
    /// A stop loss or take profit crossed and the position is being closed
    ExitTriggered {
        position_id: PositionId,
        symbol: String,
        kind: TriggerKind,
        price: Decimal,
    },
}
