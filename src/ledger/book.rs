//! Account book: the state guarded by the ledger lock
//!
//! Every method here runs with exclusive access, so a fill updates the
//! order, position, trade history and balance as one step.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::{
    AccountSummary, LedgerEvent, Order, OrderId, OrderRequest, OrderSide, OrderStatus, OrderType,
    PlaceOrderResult, Position, PositionEventKind, PositionId, PositionSide, Trade, TriggerKind,
};
use crate::config::AccountConfig;
use crate::error::{Result, TradingError};

/// A crossed exit found while marking a position
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingTrigger {
    pub position_id: PositionId,
    pub symbol: String,
    pub kind: TriggerKind,
    pub price: Decimal,
}

/// Balances, positions, orders and trades of one account
pub(crate) struct Book {
    config: AccountConfig,
    balances: HashMap<String, Decimal>,
    prices: HashMap<String, (Decimal, DateTime<Utc>)>,
    /// Open positions keyed by symbol
    positions: HashMap<String, Position>,
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
    next_position_id: PositionId,
    realized_pnl: Decimal,
    total_commission: Decimal,
    events: Option<mpsc::UnboundedSender<LedgerEvent>>,
}

impl Book {
    pub fn new(config: AccountConfig, events: Option<mpsc::UnboundedSender<LedgerEvent>>) -> Self {
        let mut balances = HashMap::new();
        balances.insert(config.quote_asset.clone(), config.initial_balance);
        Self {
            config,
            balances,
            prices: HashMap::new(),
            positions: HashMap::new(),
            orders: HashMap::new(),
            trades: Vec::new(),
            next_position_id: 1,
            realized_pnl: Decimal::ZERO,
            total_commission: Decimal::ZERO,
            events,
        }
    }

    fn emit(&self, event: LedgerEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                tracing::debug!("Ledger event receiver dropped");
            }
        }
    }

    pub fn free_balance(&self) -> Decimal {
        self.balance(&self.config.quote_asset)
    }

    pub fn balance(&self, asset: &str) -> Decimal {
        self.balances.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    fn adjust_balance(&mut self, delta: Decimal) {
        let asset = self.config.quote_asset.clone();
        *self.balances.entry(asset).or_insert(Decimal::ZERO) += delta;
    }

    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).map(|(p, _)| *p)
    }

    pub fn set_price(&mut self, symbol: &str, price: Decimal, timestamp: DateTime<Utc>) {
        self.prices.insert(symbol.to_string(), (price, timestamp));
    }

    /// Price a request would execute at right now
    pub fn execution_price(&self, request: &OrderRequest) -> Result<Decimal> {
        let reference = self
            .last_price(&request.symbol)
            .ok_or_else(|| TradingError::NoPriceAvailable(request.symbol.clone()))?;
        match request.order_type {
            OrderType::Market => Ok(match request.side {
                OrderSide::Buy => reference * (Decimal::ONE + self.config.slippage),
                OrderSide::Sell => reference * (Decimal::ONE - self.config.slippage),
            }),
            // validate() guarantees the limit price is present
            OrderType::Limit => request
                .limit_price
                .ok_or_else(|| TradingError::InvalidInput("limit price missing".into())),
        }
    }

    /// Validate, price and fill a request
    pub fn place(&mut self, request: &OrderRequest, now: DateTime<Utc>) -> Result<PlaceOrderResult> {
        request.validate()?;
        let price = self.execution_price(request)?;
        self.fill(request, price, now)
    }

    /// Fill a request in full at `price`
    pub fn fill(
        &mut self,
        request: &OrderRequest,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PlaceOrderResult> {
        let quantity = request.quantity;
        let notional = quantity * price;
        let commission = notional * self.config.commission_rate;

        if request.side == OrderSide::Buy {
            let required = notional + commission;
            let available = self.free_balance();
            if required > available {
                return Err(TradingError::InsufficientBalance {
                    required,
                    available,
                });
            }
        }

        let mut order = Order::from_request(request, now);
        order.status = OrderStatus::Open;

        let mut trades = Vec::with_capacity(2);
        let mut remaining = quantity;
        let mut remaining_commission = commission;

        // Offset an opposing position first
        if let Some(existing) = self.positions.remove(&request.symbol) {
            if existing.side.entry_side() == request.side {
                self.positions.insert(request.symbol.clone(), existing);
            } else {
                let close_qty = remaining.min(existing.quantity);
                let close_commission = if close_qty == quantity {
                    commission
                } else {
                    commission * close_qty / quantity
                };
                let trade = self.reduce(existing, &order, close_qty, price, close_commission, now);
                trades.push(trade);
                remaining -= close_qty;
                remaining_commission -= close_commission;
            }
        }

        if remaining > Decimal::ZERO {
            let trade = self.increase(&order, request, remaining, price, remaining_commission, now);
            trades.push(trade);
        }

        match request.side {
            OrderSide::Buy => self.adjust_balance(-(notional + commission)),
            OrderSide::Sell => self.adjust_balance(notional - commission),
        }
        self.total_commission += commission;

        order.status = OrderStatus::Filled;
        order.filled_quantity = quantity;
        order.avg_fill_price = price;
        order.commission = commission;
        order.filled_at = Some(now);
        self.orders.insert(order.id, order.clone());
        self.emit(LedgerEvent::OrderFilled {
            order: order.clone(),
        });

        self.check_invariants()?;

        tracing::debug!(
            order_id = %order.id,
            symbol = %order.symbol,
            side = ?order.side,
            %quantity,
            %price,
            %commission,
            "Order filled"
        );

        Ok(PlaceOrderResult {
            position: self.positions.get(&request.symbol).cloned(),
            order,
            trades,
        })
    }

    /// Reduce (or close) a position taken out of the book by `qty` at `price`
    fn reduce(
        &mut self,
        mut position: Position,
        order: &Order,
        qty: Decimal,
        price: Decimal,
        commission: Decimal,
        now: DateTime<Utc>,
    ) -> Trade {
        let symbol = order.symbol.clone();

        let realized = (price - position.entry_price) * qty * position.side.sign();
        position.quantity -= qty;
        position.realized_pnl += realized;
        position.order_ids.push(order.id);
        position.mark(price, now);
        self.realized_pnl += realized;

        let trade = Trade {
            id: Uuid::new_v4(),
            order_id: order.id,
            position_id: Some(position.id),
            symbol: symbol.clone(),
            side: order.side,
            quantity: qty,
            price,
            commission,
            realized_pnl: realized,
            strategy_tag: order.strategy_tag.clone(),
            executed_at: now,
        };
        self.trades.push(trade.clone());

        let kind = if position.quantity.is_zero() {
            tracing::info!(
                position_id = position.id,
                symbol = %symbol,
                %realized,
                total_realized = %position.realized_pnl,
                "Position closed"
            );
            PositionEventKind::Closed
        } else {
            self.positions.insert(symbol, position.clone());
            PositionEventKind::Reduced
        };

        self.emit(LedgerEvent::Position {
            kind,
            position,
            trade: Some(trade.clone()),
        });
        trade
    }

    /// Add `qty` in the order's direction, opening a position if none exists
    fn increase(
        &mut self,
        order: &Order,
        request: &OrderRequest,
        qty: Decimal,
        price: Decimal,
        commission: Decimal,
        now: DateTime<Utc>,
    ) -> Trade {
        let symbol = order.symbol.clone();
        let (position, kind) = match self.positions.remove(&symbol) {
            Some(mut position) => {
                let total = position.quantity + qty;
                position.entry_price =
                    (position.entry_price * position.quantity + price * qty) / total;
                position.quantity = total;
                if request.stop_loss.is_some() {
                    position.stop_loss = request.stop_loss;
                }
                if request.take_profit.is_some() {
                    position.take_profit = request.take_profit;
                }
                position.order_ids.push(order.id);
                position.mark(price, now);
                (position, PositionEventKind::Increased)
            }
            None => {
                let id = self.next_position_id;
                self.next_position_id += 1;
                let position = Position {
                    id,
                    symbol: symbol.clone(),
                    side: PositionSide::from_order_side(order.side),
                    quantity: qty,
                    entry_price: price,
                    current_price: price,
                    stop_loss: request.stop_loss,
                    take_profit: request.take_profit,
                    realized_pnl: Decimal::ZERO,
                    unrealized_pnl: Decimal::ZERO,
                    unrealized_pnl_pct: Decimal::ZERO,
                    strategy_tag: order.strategy_tag.clone(),
                    open_time: now,
                    updated_at: now,
                    order_ids: vec![order.id],
                };
                tracing::info!(
                    position_id = id,
                    symbol = %symbol,
                    side = ?position.side,
                    quantity = %qty,
                    entry = %price,
                    "Position opened"
                );
                (position, PositionEventKind::Opened)
            }
        };

        let trade = Trade {
            id: Uuid::new_v4(),
            order_id: order.id,
            position_id: Some(position.id),
            symbol: symbol.clone(),
            side: order.side,
            quantity: qty,
            price,
            commission,
            realized_pnl: Decimal::ZERO,
            strategy_tag: order.strategy_tag.clone(),
            executed_at: now,
        };
        self.trades.push(trade.clone());
        self.positions.insert(symbol, position.clone());
        self.emit(LedgerEvent::Position {
            kind,
            position,
            trade: Some(trade.clone()),
        });
        trade
    }

    /// Mark the symbol's position and report a crossed exit
    pub fn mark(
        &mut self,
        symbol: &str,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Option<PendingTrigger> {
        let position = self.positions.get_mut(symbol)?;
        position.mark(price, now);
        let kind = position.trigger_at(price)?;
        Some(PendingTrigger {
            position_id: position.id,
            symbol: symbol.to_string(),
            kind,
            price,
        })
    }

    /// Close the position named by a trigger, if it is still there and still
    /// crossed at the latest reference price
    ///
    /// The close executes at that latest price, which is the trigger's own
    /// price unless another update landed in between.
    pub fn execute_trigger(
        &mut self,
        trigger: &PendingTrigger,
        now: DateTime<Utc>,
    ) -> Result<Option<PlaceOrderResult>> {
        let Some(position) = self.positions.get(&trigger.symbol) else {
            return Ok(None);
        };
        if position.id != trigger.position_id {
            return Ok(None);
        }
        let price = self.last_price(&trigger.symbol).unwrap_or(trigger.price);
        let Some(kind) = position.trigger_at(price) else {
            return Ok(None);
        };

        let request = OrderRequest::market(
            &position.symbol,
            position.side.entry_side().opposite(),
            position.quantity,
        )
        .with_tag(position.strategy_tag.clone())
        .with_client_id(format!("{}:{}", kind, position.id));

        tracing::info!(
            position_id = trigger.position_id,
            symbol = %trigger.symbol,
            %kind,
            %price,
            "Exit triggered"
        );
        self.emit(LedgerEvent::ExitTriggered {
            position_id: trigger.position_id,
            symbol: trigger.symbol.clone(),
            kind,
            price,
        });

        self.fill(&request, price, now).map(Some)
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.values().find(|p| p.id == id)
    }

    /// Market request that flattens a position
    pub fn close_request(&self, id: PositionId) -> Result<OrderRequest> {
        let position = self
            .position(id)
            .ok_or_else(|| TradingError::NotFound(format!("position {}", id)))?;
        Ok(OrderRequest::market(
            &position.symbol,
            position.side.entry_side().opposite(),
            position.quantity,
        )
        .with_tag(position.strategy_tag.clone()))
    }

    /// Move a position's stop loss or take profit
    pub fn set_exit(
        &mut self,
        id: PositionId,
        kind: TriggerKind,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Position> {
        if price <= Decimal::ZERO {
            return Err(TradingError::InvalidInput(format!("{} must be positive", kind)));
        }
        let position = self
            .positions
            .values_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| TradingError::NotFound(format!("position {}", id)))?;
        match kind {
            TriggerKind::StopLoss => position.stop_loss = Some(price),
            TriggerKind::TakeProfit => position.take_profit = Some(price),
        }
        position.updated_at = now;
        let updated = position.clone();
        self.emit(LedgerEvent::Position {
            kind: PositionEventKind::Modified,
            position: updated.clone(),
            trade: None,
        });
        Ok(updated)
    }

    pub fn cancel(&mut self, id: OrderId) -> Result<Order> {
        let order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| TradingError::NotFound(format!("order {}", id)))?;
        if !order.status.is_active() {
            return Err(TradingError::InvalidState(format!(
                "order {} is {:?}",
                id, order.status
            )));
        }
        order.status = OrderStatus::Canceled;
        let canceled = order.clone();
        self.emit(LedgerEvent::OrderCanceled {
            order: canceled.clone(),
        });
        Ok(canceled)
    }

    pub fn positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by_key(|p| p.id);
        positions
    }

    pub fn orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.values().cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    pub fn open_orders(&self) -> Vec<Order> {
        self.orders()
            .into_iter()
            .filter(|o| o.status.is_active())
            .collect()
    }

    /// Most recent `limit` trades, oldest first
    pub fn trades(&self, limit: Option<usize>) -> Vec<Trade> {
        let skip = limit.map_or(0, |n| self.trades.len().saturating_sub(n));
        self.trades[skip..].to_vec()
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    /// Free balance plus the marked value of open positions
    pub fn equity(&self) -> Decimal {
        let basis: Decimal = self.positions.values().map(|p| p.signed_cost_basis()).sum();
        self.free_balance() + basis + self.unrealized_pnl()
    }

    pub fn summary(&self, now: DateTime<Utc>) -> AccountSummary {
        let mut open_symbols: Vec<String> = self.positions.keys().cloned().collect();
        open_symbols.sort();
        AccountSummary {
            quote_asset: self.config.quote_asset.clone(),
            initial_balance: self.config.initial_balance,
            free_balance: self.free_balance(),
            equity: self.equity(),
            unrealized_pnl: self.unrealized_pnl(),
            realized_pnl: self.realized_pnl,
            total_commission: self.total_commission,
            open_positions: self.positions.len(),
            open_orders: self.orders.values().filter(|o| o.status.is_active()).count(),
            total_trades: self.trades.len(),
            open_symbols,
            timestamp: now,
        }
    }

    fn check_invariants(&self) -> Result<()> {
        for (symbol, position) in &self.positions {
            if position.quantity <= Decimal::ZERO {
                return Err(TradingError::InvariantViolation(format!(
                    "position {} on {} has quantity {}",
                    position.id, symbol, position.quantity
                )));
            }
            if &position.symbol != symbol {
                return Err(TradingError::InvariantViolation(format!(
                    "position {} keyed under {} but belongs to {}",
                    position.id, symbol, position.symbol
                )));
            }
        }
        if self.free_balance() < Decimal::ZERO {
            return Err(TradingError::InvariantViolation(format!(
                "free balance went negative: {}",
                self.free_balance()
            )));
        }
        Ok(())
    }
}
