use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub type SessionId = u64;
pub type SnapshotId = u64;

// Current Schema Version (documents without the field are treated as this version)
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

fn current_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

/// Accepts both integer and fractional counters.
///
/// Documents written by earlier builds stored running totals as floats;
/// they are truncated on load.
fn lenient_counter<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Counter {
        Int(u64),
        Float(f64),
    }

    match Counter::deserialize(deserializer)? {
        Counter::Int(v) => Ok(v),
        Counter::Float(v) if v.is_finite() && v >= 0.0 => Ok(v.trunc() as u64),
        Counter::Float(v) => Err(serde::de::Error::custom(format!(
            "counter must be a non-negative number, found {}",
            v
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// One tracked start-to-stop interval of generator activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_counter")]
    pub total_hashes: u64,
    #[serde(deserialize_with = "lenient_counter")]
    pub accepted_hashes: u64,
    pub hashes_per_second: f64,
    pub status: SessionStatus,
}

impl Session {
    pub fn new(id: SessionId, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            start_time,
            end_time: None,
            total_hashes: 0,
            accepted_hashes: 0,
            hashes_per_second: 0.0,
            status: SessionStatus::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Transitions `running -> stopped`. Returns false if already stopped.
    pub fn close(&mut self, end_time: DateTime<Utc>) -> bool {
        if !self.is_running() {
            return false;
        }
        // Clock steps backwards must not produce end < start.
        self.end_time = Some(end_time.max(self.start_time));
        self.status = SessionStatus::Stopped;
        true
    }
}

/// One immutable timestamped throughput sample, referencing a session by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub id: SnapshotId,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub hashes_per_second: f64,
    #[serde(deserialize_with = "lenient_counter")]
    pub total_hashes: u64,
}

/// Cumulative generator output at one tick. Delivered by value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MiningStats {
    pub hashes_per_second: f64,
    pub total_hashes: u64,
    pub accepted_hashes: u64,
}

/// Aggregate view across all sessions. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_sessions: u64,
    pub total_hashes: u64,
    pub accepted_hashes: u64,
    pub avg_hash_rate: f64,
}

impl OverallStats {
    pub fn from_sessions(sessions: &[Session]) -> Self {
        if sessions.is_empty() {
            return Self::default();
        }

        // Counters are unbounded per session; the totals saturate at u64::MAX.
        let total_hashes = sessions
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.total_hashes));
        let accepted_hashes = sessions
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.accepted_hashes));
        let rate_sum: f64 = sessions.iter().map(|s| s.hashes_per_second).sum();

        Self {
            total_sessions: sessions.len() as u64,
            total_hashes,
            accepted_hashes,
            avg_hash_rate: rate_sum / sessions.len() as f64,
        }
    }
}

/// The whole persisted dataset: one document, two ordered collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningDatabase {
    #[serde(default = "current_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub stats: Vec<StatSnapshot>,
}

impl Default for MiningDatabase {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            sessions: Vec::new(),
            stats: Vec::new(),
        }
    }
}

impl MiningDatabase {
    pub fn find_session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn find_session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn max_session_id(&self) -> Option<SessionId> {
        self.sessions.iter().map(|s| s.id).max()
    }

    pub fn max_snapshot_id(&self) -> Option<SnapshotId> {
        self.stats.iter().map(|s| s.id).max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tick_interval_ms: u64,
    pub min_hash_rate: f64,
    pub max_hash_rate: f64,
    pub acceptance_ratio: f64,
    /// Overrides the default `mining-data.json` location.
    pub data_file: Option<std::path::PathBuf>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            min_hash_rate: 100.0,
            max_hash_rate: 600.0,
            acceptance_ratio: 0.92,
            data_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".to_string());
        }
        if !(self.min_hash_rate.is_finite() && self.max_hash_rate.is_finite()) {
            return Err("hash rate bounds must be finite".to_string());
        }
        if self.min_hash_rate < 0.0 || self.min_hash_rate >= self.max_hash_rate {
            return Err(format!(
                "invalid hash rate range [{}, {})",
                self.min_hash_rate, self.max_hash_rate
            ));
        }
        if !(self.acceptance_ratio > 0.0 && self.acceptance_ratio <= 1.0) {
            return Err(format!(
                "acceptance_ratio must be in (0, 1], found {}",
                self.acceptance_ratio
            ));
        }
        Ok(())
    }
}
