//! Error types for Ruta
//!
//! The first five variants are the expected outcomes of racing or out-of-turn
//! commands. They are surfaced to the user as-is and never retried by the core.
//! Everything else is an infrastructure failure.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::ids::{TripId, WorkerId};
use crate::types::lifecycle::TripStatus;

/// Result type alias using RutaError
pub type Result<T> = std::result::Result<T, RutaError>;

/// Unified error type for Ruta operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RutaError {
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: TripStatus, to: TripStatus },

    #[error("Trip {trip_id} is already assigned")]
    AlreadyAssigned { trip_id: TripId },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("Worker {worker_id} is not eligible: {reason}")]
    NotEligible { worker_id: WorkerId, reason: String },

    #[error("Invalid negotiation state: {0}")]
    InvalidNegotiationState(String),

    #[error("Trip not found: {0}")]
    TripNotFound(TripId),

    #[error("Validation error: {0}")]
    Validation(String),

    // Optimistic retries exhausted
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RutaError {
    /// Whether the user can act on this error (reload balance, pick another trip, ...)
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            RutaError::InvalidTransition { .. }
                | RutaError::AlreadyAssigned { .. }
                | RutaError::InsufficientFunds { .. }
                | RutaError::NotEligible { .. }
                | RutaError::InvalidNegotiationState(_)
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RutaError::InvalidTransition { .. } => "invalid_transition",
            RutaError::AlreadyAssigned { .. } => "already_assigned",
            RutaError::InsufficientFunds { .. } => "insufficient_funds",
            RutaError::NotEligible { .. } => "not_eligible",
            RutaError::InvalidNegotiationState(_) => "invalid_negotiation_state",
            RutaError::TripNotFound(_) => "trip_not_found",
            RutaError::Validation(_) => "validation",
            RutaError::Conflict(_) => "conflict",
            RutaError::Storage(_) => "storage",
            RutaError::Config(_) => "config",
            RutaError::Serialization(_) => "serialization",
            RutaError::Internal(_) => "internal",
        }
    }
}

// Implement From for common external error types
impl From<serde_json::Error> for RutaError {
    fn from(err: serde_json::Error) -> Self {
        RutaError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for RutaError {
    fn from(err: std::io::Error) -> Self {
        RutaError::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for RutaError {
    fn from(err: anyhow::Error) -> Self {
        RutaError::Internal(err.to_string())
    }
}

impl From<prometheus::Error> for RutaError {
    fn from(err: prometheus::Error) -> Self {
        RutaError::Internal(format!("metrics: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_display() {
        let err = RutaError::InvalidTransition {
            from: TripStatus::Requested,
            to: TripStatus::Completed,
        };
        assert_eq!(err.to_string(), "Invalid transition: requested -> completed");
    }

    #[test]
    fn test_insufficient_funds_display() {
        let err = RutaError::InsufficientFunds {
            required: dec!(5),
            available: dec!(4),
        };
        assert!(err.to_string().contains("required 5, available 4"));
    }

    #[test]
    fn test_recoverable_split() {
        let trip_id = TripId::new();
        assert!(RutaError::AlreadyAssigned { trip_id }.is_user_recoverable());
        assert!(RutaError::InvalidNegotiationState("pending".into()).is_user_recoverable());
        assert!(!RutaError::Storage("disk".into()).is_user_recoverable());
        assert!(!RutaError::TripNotFound(trip_id).is_user_recoverable());
    }
}
