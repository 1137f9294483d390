//! paper-desk: simulated execution and risk core for automated trading
//!
//! This library provides the core components for:
//! - An account ledger with immediate simulated fills, stop loss and take profit
//! - Position sizing (fixed risk, ATR, Kelly, optimal-f) and limit clamps
//! - A risk manager with drawdown, loss-window and losing-streak circuit breakers
//! - An orchestrator that gates trading on a global run state
//! - A broadcast hub fanning state out to bounded subscriber queues
//! - Market event replay from JSON-lines files
//! - Structured logging and Prometheus metrics

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod orchestrator;
pub mod risk;
pub mod signal;
pub mod telemetry;

pub use error::{RejectReason, Result, TradingError};
