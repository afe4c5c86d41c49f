//! Error types for the scoring core and its adapters.
//!
//! Every abort-class failure surfaces to callers as a [`ServiceError`] whose
//! [`ErrorKind`] tells the input, oracle and store cases apart. Cache failures
//! have their own type and never reach `ServiceError`.

use serde::Serialize;
use thiserror::Error;

/// Rejected before any external call is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("missing address")]
    Missing,

    #[error("address too short: {address:?} has {len} chars, need at least {min}")]
    TooShort {
        address: String,
        len: usize,
        min: usize,
    },

    #[error("malformed address {address:?}: {reason}")]
    Malformed { address: String, reason: String },

    #[error("unreadable request body: {0}")]
    Body(String),
}

/// Balance lookup failures.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("balance request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("invalid balance response: {0}")]
    InvalidResponse(String),

    #[error("oracle returned negative balance {balance} for {address}")]
    NegativeBalance { address: String, balance: String },
}

/// Record store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional create or update lost against a concurrent writer.
    #[error("concurrent write conflict for {address}")]
    Conflict { address: String },

    #[error("gave up on {address} after {attempts} conflicting writes")]
    Contended { address: String, attempts: u32 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Score cache failures. Best-effort only.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Discriminant carried to the caller alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    Oracle,
    Store,
}

/// Failure of an update or leaderboard operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    #[error("balance lookup failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("record store failed: {0}")]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) => ErrorKind::Input,
            Self::Oracle(_) => ErrorKind::Oracle,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// Oracle failures are transient from the caller's point of view.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Oracle(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let input: ServiceError = InputError::Missing.into();
        assert_eq!(input.kind(), ErrorKind::Input);
        assert!(!input.is_retryable());

        let oracle: ServiceError = OracleError::Rpc("boom".into()).into();
        assert_eq!(oracle.kind(), ErrorKind::Oracle);
        assert!(oracle.is_retryable());

        let store: ServiceError = StoreError::Conflict {
            address: "0xabc".into(),
        }
        .into();
        assert_eq!(store.kind(), ErrorKind::Store);
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::Oracle).unwrap(),
            "\"oracle\""
        );
    }
}
