use thiserror::Error;

use crate::domain::models::SessionId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invariant violated for session {session_id}: {reason}")]
    InvariantViolation { session_id: SessionId, reason: String },
    #[error("Counter regression for session {session_id}: {field} {current} -> {requested}")]
    CounterRegression {
        session_id: SessionId,
        field: &'static str,
        current: u64,
        requested: u64,
    },
    #[error("Failed to persist store: {0:#}")]
    Persist(#[source] anyhow::Error),
    #[error("No {0} ids left to allocate")]
    IdsExhausted(&'static str),
    #[error("Store service is not running")]
    ServiceUnavailable,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Session {0} is already active")]
    AlreadyActive(SessionId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Failed to spawn generator thread: {0}")]
    Spawn(#[from] std::io::Error),
}
