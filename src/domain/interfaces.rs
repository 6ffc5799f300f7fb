use chrono::{DateTime, Utc};

/// Abstraction for reading wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
