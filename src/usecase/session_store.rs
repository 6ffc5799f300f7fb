use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::domain::errors::StoreError;
use crate::domain::ids::IdAllocator;
use crate::domain::interfaces::Clock;
use crate::domain::models::{
    MiningDatabase, MiningStats, OverallStats, Session, SessionId, StatSnapshot,
};
use crate::domain::repositories::MiningDataRepository;

/// Durable record of all sessions and snapshots.
///
/// Every mutation is applied to a copy of the dataset, the copy is written
/// in full, and only then does it replace the in-memory state. A failed
/// write therefore leaves the store exactly as it was.
pub struct SessionStore<R> {
    repository: R,
    clock: Arc<dyn Clock>,
    data: MiningDatabase,
    session_ids: IdAllocator,
    snapshot_ids: IdAllocator,
}

impl<R: MiningDataRepository> SessionStore<R> {
    /// Loads the dataset. Unreadable storage is set aside and the store
    /// starts empty; opening never fails.
    pub fn open(repository: R, clock: Arc<dyn Clock>) -> Self {
        let data = repository.load().unwrap_or_else(|e| {
            error!("Failed to load mining data, starting empty: {:#}", e);
            if let Err(qe) = repository.quarantine() {
                error!("Failed to set aside unreadable mining data: {:#}", qe);
            }
            MiningDatabase::default()
        });

        info!(
            "Session store opened: {} sessions, {} snapshots",
            data.sessions.len(),
            data.stats.len()
        );

        let session_ids = IdAllocator::starting_after(data.max_session_id());
        let snapshot_ids = IdAllocator::starting_after(data.max_snapshot_id());

        Self {
            repository,
            clock,
            data,
            session_ids,
            snapshot_ids,
        }
    }

    fn commit(&mut self, next: MiningDatabase) -> Result<(), StoreError> {
        if let Err(e) = self.repository.save(&next) {
            error!("Failed to save mining data: {:#}", e);
            return Err(StoreError::Persist(e));
        }
        self.data = next;
        Ok(())
    }

    pub fn start_session(&mut self) -> Result<SessionId, StoreError> {
        let now = self.clock.now();
        let id = self
            .session_ids
            .next(now)
            .ok_or(StoreError::IdsExhausted("session"))?;

        let mut next = self.data.clone();
        next.sessions.push(Session::new(id, now));
        self.commit(next)?;

        info!("Session {} started at {}", id, now.to_rfc3339());
        Ok(id)
    }

    /// Closes a running session. Unknown or already stopped ids are a no-op.
    pub fn stop_session(&mut self, id: SessionId) -> Result<(), StoreError> {
        match self.data.find_session(id) {
            Some(session) if session.is_running() => {}
            Some(_) => {
                debug!("stop_session({}): already stopped", id);
                return Ok(());
            }
            None => {
                debug!("stop_session({}): unknown session", id);
                return Ok(());
            }
        }

        let now = self.clock.now();
        let mut next = self.data.clone();
        if let Some(session) = next.find_session_mut(id) {
            session.close(now);
        }
        self.commit(next)?;

        info!("Session {} stopped", id);
        Ok(())
    }

    /// Overwrites the counters of a session.
    ///
    /// `accepted_hashes` above `total_hashes` is clamped. Counters lower
    /// than the stored ones are rejected and nothing is written. Unknown
    /// ids are a no-op.
    pub fn update_stats(&mut self, id: SessionId, stats: MiningStats) -> Result<(), StoreError> {
        let current = match self.data.find_session(id) {
            Some(session) => session,
            None => {
                debug!("update_stats({}): unknown session", id);
                return Ok(());
            }
        };

        validate_rate(id, stats.hashes_per_second)?;

        let mut accepted = stats.accepted_hashes;
        if accepted > stats.total_hashes {
            warn!(
                "Session {}: accepted_hashes {} exceeds total_hashes {}, clamping",
                id, accepted, stats.total_hashes
            );
            accepted = stats.total_hashes;
        }

        if stats.total_hashes < current.total_hashes {
            return Err(StoreError::CounterRegression {
                session_id: id,
                field: "total_hashes",
                current: current.total_hashes,
                requested: stats.total_hashes,
            });
        }
        if accepted < current.accepted_hashes {
            return Err(StoreError::CounterRegression {
                session_id: id,
                field: "accepted_hashes",
                current: current.accepted_hashes,
                requested: accepted,
            });
        }

        let mut next = self.data.clone();
        if let Some(session) = next.find_session_mut(id) {
            session.hashes_per_second = stats.hashes_per_second;
            session.total_hashes = stats.total_hashes;
            session.accepted_hashes = accepted;
        }
        self.commit(next)
    }

    /// Appends an immutable snapshot. The session id is not checked, so
    /// orphaned snapshots are stored as given.
    pub fn add_snapshot(
        &mut self,
        session_id: SessionId,
        hashes_per_second: f64,
        total_hashes: u64,
    ) -> Result<(), StoreError> {
        validate_rate(session_id, hashes_per_second)?;

        let now = self.clock.now();
        let id = self
            .snapshot_ids
            .next(now)
            .ok_or(StoreError::IdsExhausted("snapshot"))?;

        let mut next = self.data.clone();
        next.stats.push(StatSnapshot {
            id,
            session_id,
            timestamp: now,
            hashes_per_second,
            total_hashes,
        });
        self.commit(next)
    }

    /// All sessions, newest `start_time` first; ties go to the higher id.
    pub fn list_sessions(&self) -> Vec<Session> {
        let mut sessions = self.data.sessions.clone();
        sessions.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| b.id.cmp(&a.id))
        });
        sessions
    }

    /// Snapshots of one session, oldest `timestamp` first.
    pub fn list_snapshots(&self, session_id: SessionId) -> Vec<StatSnapshot> {
        let mut stats: Vec<StatSnapshot> = self
            .data
            .stats
            .iter()
            .filter(|s| s.session_id == session_id)
            .cloned()
            .collect();
        stats.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        stats
    }

    pub fn overall_stats(&self) -> OverallStats {
        OverallStats::from_sessions(&self.data.sessions)
    }

    pub fn get_session(&self, id: SessionId) -> Option<Session> {
        self.data.find_session(id).cloned()
    }

    /// Closes sessions left `running` by a process that did not shut down
    /// cleanly. Each one ends at its last snapshot, or at its start if it
    /// has none.
    pub fn recover_interrupted_sessions(&mut self) -> Result<Vec<SessionId>, StoreError> {
        let mut next = self.data.clone();
        let mut recovered = Vec::new();

        for session in next.sessions.iter_mut().filter(|s| s.is_running()) {
            let last_seen = self
                .data
                .stats
                .iter()
                .filter(|s| s.session_id == session.id)
                .map(|s| s.timestamp)
                .max()
                .unwrap_or(session.start_time);
            session.close(last_seen);
            recovered.push(session.id);
        }

        if recovered.is_empty() {
            return Ok(recovered);
        }

        self.commit(next)?;
        warn!("Closed {} interrupted session(s): {:?}", recovered.len(), recovered);
        Ok(recovered)
    }

    /// Flushes the dataset one last time and releases the store.
    pub fn close(self) -> Result<(), StoreError> {
        info!("Session store closing. Saving mining data...");
        self.repository.save(&self.data).map_err(|e| {
            error!("Exit save failed: {:#}", e);
            StoreError::Persist(e)
        })
    }
}

fn validate_rate(session_id: SessionId, rate: f64) -> Result<(), StoreError> {
    if rate.is_finite() && rate >= 0.0 {
        Ok(())
    } else {
        Err(StoreError::InvariantViolation {
            session_id,
            reason: format!("hashes_per_second must be a non-negative number, found {}", rate),
        })
    }
}
