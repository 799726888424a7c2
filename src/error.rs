//! Error types for the message broker.

use crate::handler::BoxError;
use crate::subscriptions::SubscriptionId;
use thiserror::Error;

/// Main error type for broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Invalid topic pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Handler for {subscription} failed: {source}")]
    Handler {
        subscription: SubscriptionId,
        #[source]
        source: BoxError,
    },

    #[error("Payload type mismatch: expected {expected}, got {found}")]
    PayloadMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Missing payload: handler expects {expected}")]
    MissingPayload { expected: &'static str },
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
