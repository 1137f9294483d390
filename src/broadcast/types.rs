//! Subscriber message types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::feed::{Candle, PriceTick};
use crate::ledger::{Position, PositionEventKind, Trade};
use crate::orchestrator::{ErrorRecord, SignalRecord, TradingState};
use crate::risk::RiskEvent;

/// Subscriber id assigned by the hub
pub type SubscriberId = u64;

/// Position change pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionUpdate {
    pub kind: PositionEventKind,
    pub position: Position,
}

/// Indicator values computed by the strategy layer for one symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub values: BTreeMap<String, Decimal>,
}

/// Message body, tagged by `type` with the body under `data`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Payload {
    State(Box<TradingState>),
    Candle(Candle),
    Signal(SignalRecord),
    Trade(Trade),
    Position(PositionUpdate),
    Risk(RiskEvent),
    Indicators(IndicatorSnapshot),
    Price(PriceTick),
    Error(ErrorRecord),
}

impl Payload {
    /// The `type` tag this payload serializes with
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::State(_) => "state",
            Payload::Candle(_) => "candle",
            Payload::Signal(_) => "signal",
            Payload::Trade(_) => "trade",
            Payload::Position(_) => "position",
            Payload::Risk(_) => "risk",
            Payload::Indicators(_) => "indicators",
            Payload::Price(_) => "price",
            Payload::Error(_) => "error",
        }
    }
}

/// Envelope delivered to every subscriber: `{type, timestamp, data}`
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(flatten)]
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Wrap a payload stamped with the current time
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
