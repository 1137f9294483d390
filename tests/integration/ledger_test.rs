//! Ledger accounting properties through the public engine API

use chrono::Utc;
use paper_desk::config::AccountConfig;
use paper_desk::ledger::{
    ExecutionEngine, OrderRequest, OrderSide, PaperLedger, PositionSide, Trade,
};
use paper_desk::TradingError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn account(commission: Decimal, slippage: Decimal) -> AccountConfig {
    AccountConfig {
        initial_balance: dec!(100000),
        quote_asset: "USDT".into(),
        commission_rate: commission,
        slippage,
    }
}

fn cash_flow(trade: &Trade) -> Decimal {
    let notional = trade.quantity * trade.price;
    match trade.side {
        OrderSide::Buy => -(notional + trade.commission),
        OrderSide::Sell => notional - trade.commission,
    }
}

#[tokio::test]
async fn test_balance_conservation_over_fills() {
    let ledger = PaperLedger::new(account(dec!(0.001), dec!(0.0005)));
    let now = Utc::now();
    ledger.update_price("ETHUSDT", dec!(2000), now).await.unwrap();
    ledger.update_price("BTCUSDT", dec!(40000), now).await.unwrap();

    let orders = [
        OrderRequest::market("ETHUSDT", OrderSide::Buy, dec!(5)),
        OrderRequest::market("BTCUSDT", OrderSide::Sell, dec!(0.5)),
        OrderRequest::market("ETHUSDT", OrderSide::Buy, dec!(2)),
        OrderRequest::market("ETHUSDT", OrderSide::Sell, dec!(10)), // flips short
        OrderRequest::limit("BTCUSDT", OrderSide::Buy, dec!(0.25), dec!(39500)),
    ];
    for (i, order) in orders.into_iter().enumerate() {
        let price = dec!(2000) + Decimal::from(i as u32 * 10);
        ledger.update_price("ETHUSDT", price, Utc::now()).await.unwrap();
        ledger.place_order(order).await.unwrap();
    }

    let trades = ledger.trades(None).await;
    let expected = dec!(100000) + trades.iter().map(cash_flow).sum::<Decimal>();
    assert_eq!(ledger.balance("USDT").await, expected);

    let summary = ledger.account_summary().await;
    let commission: Decimal = trades.iter().map(|t| t.commission).sum();
    assert_eq!(summary.total_commission, commission);
}

#[tokio::test]
async fn test_round_trip_costs_only_commission() {
    let ledger = PaperLedger::new(account(dec!(0.001), dec!(0)));
    ledger
        .update_price("ETHUSDT", dec!(2000), Utc::now())
        .await
        .unwrap();

    let opened = ledger
        .place_order(OrderRequest::market("ETHUSDT", OrderSide::Buy, dec!(10)))
        .await
        .unwrap();
    let position = opened.position.unwrap();
    let closed = ledger.close_position(position.id).await.unwrap();

    // 20 commission each way
    assert_eq!(closed.realized_pnl(), dec!(0));
    assert_eq!(ledger.balance("USDT").await, dec!(99960));
    assert_eq!(ledger.account_summary().await.equity, dec!(99960));
    assert!(ledger.positions().await.is_empty());
}

#[tokio::test]
async fn test_oversized_opposing_fill_flips() {
    let ledger = PaperLedger::new(account(dec!(0), dec!(0)));
    ledger
        .update_price("ETHUSDT", dec!(2000), Utc::now())
        .await
        .unwrap();
    ledger
        .place_order(OrderRequest::market("ETHUSDT", OrderSide::Buy, dec!(10)))
        .await
        .unwrap();

    ledger
        .update_price("ETHUSDT", dec!(2100), Utc::now())
        .await
        .unwrap();
    let result = ledger
        .place_order(OrderRequest::market("ETHUSDT", OrderSide::Sell, dec!(15)))
        .await
        .unwrap();

    // Closing trade first, then the opening trade of the new short
    assert_eq!(result.trades.len(), 2);
    assert_eq!(result.trades[0].realized_pnl, dec!(1000));
    assert_eq!(result.trades[0].quantity, dec!(10));
    assert_eq!(result.trades[1].quantity, dec!(5));

    let positions = ledger.positions().await;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].side, PositionSide::Short);
    assert_eq!(positions[0].quantity, dec!(5));
    assert_eq!(positions[0].entry_price, dec!(2100));

    assert_eq!(ledger.balance("USDT").await, dec!(111500));
    assert_eq!(ledger.account_summary().await.equity, dec!(101000));
}

#[tokio::test]
async fn test_stop_fires_once_at_update_price() {
    let ledger = PaperLedger::new(account(dec!(0), dec!(0)));
    ledger
        .update_price("ETHUSDT", dec!(2000), Utc::now())
        .await
        .unwrap();
    ledger
        .place_order(
            OrderRequest::market("ETHUSDT", OrderSide::Buy, dec!(50))
                .with_exits(Some(dec!(1960)), Some(dec!(2100))),
        )
        .await
        .unwrap();

    let closed = ledger
        .update_price("ETHUSDT", dec!(1950), Utc::now())
        .await
        .unwrap()
        .expect("stop should fire");
    assert_eq!(closed.trades[0].price, dec!(1950));
    assert_eq!(closed.realized_pnl(), dec!(-2500));

    for price in [dec!(1940), dec!(1930), dec!(2200)] {
        let again = ledger
            .update_price("ETHUSDT", price, Utc::now())
            .await
            .unwrap();
        assert!(again.is_none());
    }
    assert!(ledger.positions().await.is_empty());
    assert_eq!(ledger.trades(None).await.len(), 2);
}

#[tokio::test]
async fn test_rejected_buy_leaves_ledger_untouched() {
    let ledger = PaperLedger::new(account(dec!(0.001), dec!(0)));
    ledger
        .update_price("ETHUSDT", dec!(2000), Utc::now())
        .await
        .unwrap();

    let err = ledger
        .place_order(OrderRequest::market("ETHUSDT", OrderSide::Buy, dec!(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, TradingError::InsufficientBalance { .. }));

    let err = ledger
        .place_order(OrderRequest::market("SOLUSDT", OrderSide::Buy, dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, TradingError::NoPriceAvailable(_)));

    assert_eq!(ledger.balance("USDT").await, dec!(100000));
    assert!(ledger.trades(None).await.is_empty());
    assert!(ledger.positions().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_orders_serialize_on_ledger() {
    let ledger = std::sync::Arc::new(PaperLedger::new(account(dec!(0), dec!(0))));
    ledger
        .update_price("ETHUSDT", dec!(100), Utc::now())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let ledger = std::sync::Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger
                .place_order(OrderRequest::market("ETHUSDT", OrderSide::Buy, dec!(1)))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let positions = ledger.positions().await;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].quantity, dec!(20));
    assert_eq!(ledger.balance("USDT").await, dec!(98000));
}
