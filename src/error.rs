use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Failure reported by an external collaborator (PSP, ledger, issue tracker,
/// notification carrier). Always recoverable from the saga's point of view.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Gateway timed out after {0:?}")]
    Timeout(Duration),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Gateway rejected request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),

    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),
}

impl GatewayError {
    /// Stable code used as translation key in `default_exceptions`.
    pub fn code(&self) -> &str {
        match self {
            GatewayError::Timeout(_) => "GATEWAY_TIMEOUT",
            GatewayError::Unavailable(_) => "GATEWAY_UNAVAILABLE",
            GatewayError::Rejected { code, .. } => code,
            GatewayError::InvalidResponse(_) => "GATEWAY_INVALID_RESPONSE",
            GatewayError::CircuitOpen(_) => "GATEWAY_CIRCUIT_OPEN",
        }
    }

    /// Transient errors count against the circuit breaker; rejections do not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, GatewayError::Rejected { .. })
    }
}

/// Business-rule violations raised while validating a command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Amount {requested} exceeds the available {available}")]
    AmountExceeded { requested: i64, available: i64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} already exists")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("Invalid transition for {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Refund devolution window of {interval_days} days has expired")]
    RefundDevolutionWindowExpired { interval_days: i64 },

    #[error("Transaction not found for end to end id {0}")]
    TransactionNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::InvalidAmount => "INVALID_AMOUNT",
            DomainError::AmountExceeded { .. } => "AMOUNT_EXCEEDED",
            DomainError::NotFound { .. } => "ENTITY_NOT_FOUND",
            DomainError::AlreadyExists { .. } => "ENTITY_ALREADY_EXISTS",
            DomainError::InvalidTransition { .. } => "INVALID_STATE_TRANSITION",
            DomainError::RefundDevolutionWindowExpired { .. } => {
                "REFUND_DEVOLUTION_WINDOW_EXPIRED"
            }
            DomainError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            DomainError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Entity {0} already exists")]
    Conflict(Uuid),

    #[error("Entity {0} not found")]
    NotFound(Uuid),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Redis(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("No subscriber accepted event on topic {0}")]
    NoSubscriber(String),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors that escape a saga controller. Gateway failures never appear here:
/// controllers turn them into failure transitions.
#[derive(Error, Debug)]
pub enum SagaError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error("Invalid payload for topic {topic}: {source}")]
    Payload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Whether the bus should redeliver the message. Domain and payload errors
    /// will fail the same way on every retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SagaError::Repository(RepositoryError::Database(_))
                | SagaError::Cache(_)
                | SagaError::Emit(_)
        )
    }
}
