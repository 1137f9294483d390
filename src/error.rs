//! Error taxonomy shared by the ledger, risk manager and orchestrator

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::risk::HaltReason;

/// Why the risk manager refused a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Reward distance too small relative to stop distance
    BelowMinRiskReward,
    /// Account already holds the maximum number of positions
    PositionLimitExceeded,
    /// Trading is halted by the circuit breaker
    TradingHalted,
    /// Symbol already holds the maximum number of entries
    SymbolLimitExceeded,
    /// Sizing and limits left nothing to trade
    ZeroSize,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::BelowMinRiskReward => "below minimum risk/reward",
            RejectReason::PositionLimitExceeded => "position limit exceeded",
            RejectReason::TradingHalted => "trading halted",
            RejectReason::SymbolLimitExceeded => "symbol limit exceeded",
            RejectReason::ZeroSize => "computed size is zero",
        };
        f.write_str(s)
    }
}

/// Errors returned by core trading operations
#[derive(Debug, Clone, Error)]
pub enum TradingError {
    /// Malformed order or signal parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Buy notional plus commission exceeds free balance
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },
    /// No reference price known for the symbol yet
    #[error("No price available for {0}")]
    NoPriceAvailable(String),
    /// Unknown order or position id
    #[error("Not found: {0}")]
    NotFound(String),
    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Signal refused by a risk check
    #[error("Risk rejected: {0}")]
    RiskRejected(RejectReason),
    /// Evaluation tripped the circuit breaker
    #[error("Circuit breaker tripped: {0}")]
    CircuitBreakerTripped(HaltReason),
    /// Ledger invariant broken; the account must stop trading
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl TradingError {
    /// Whether the account must be halted after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, TradingError::InvariantViolation(_))
    }

    /// Whether the same request may succeed later without changes
    pub fn is_retryable(&self) -> bool {
        matches!(self, TradingError::NoPriceAvailable(_))
    }
}

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, TradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_invariant_violation_is_fatal() {
        assert!(TradingError::InvariantViolation("qty".into()).is_fatal());
        assert!(!TradingError::NotFound("x".into()).is_fatal());
        assert!(!TradingError::RiskRejected(RejectReason::TradingHalted).is_fatal());
    }

    #[test]
    fn test_no_price_is_retryable() {
        assert!(TradingError::NoPriceAvailable("ETHUSDT".into()).is_retryable());
        assert!(!TradingError::InvalidInput("qty".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = TradingError::RiskRejected(RejectReason::BelowMinRiskReward);
        assert_eq!(err.to_string(), "Risk rejected: below minimum risk/reward");
    }
}
