use arc_swap::ArcSwap;
use log::{error, info};
use serde::Serialize;
use std::sync::Arc;

use crate::domain::errors::ControllerError;
use crate::domain::models::{MiningStats, SessionId};
use crate::usecase::generator::MetricsGenerator;
use crate::usecase::store_service::StoreHandle;

/// Snapshot of the controller for UI consumption.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerSharedState {
    pub active_session: Option<SessionId>,
    pub last_sample: Option<MiningStats>,
    pub samples_delivered: u64,
    pub last_error: Option<String>,
}

/// Ties the generator's lifecycle to a store session.
///
/// Idle -> Active on `start()`, Active -> Idle on `stop()`. Starting while
/// Active is rejected.
pub struct SessionController {
    store: StoreHandle,
    generator: MetricsGenerator,
    active: Option<SessionId>,
    // Use ArcSwap for lock-free reads from UI thread
    shared_state: Arc<ArcSwap<ControllerSharedState>>,
}

impl SessionController {
    pub fn new(store: StoreHandle, generator: MetricsGenerator) -> Self {
        Self {
            store,
            generator,
            active: None,
            shared_state: Arc::new(ArcSwap::from_pointee(ControllerSharedState::default())),
        }
    }

    pub fn shared_state(&self) -> Arc<ArcSwap<ControllerSharedState>> {
        self.shared_state.clone()
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.active
    }

    pub fn current_stats(&self) -> MiningStats {
        self.generator.current_stats()
    }

    pub fn start(&mut self) -> Result<SessionId, ControllerError> {
        if let Some(id) = self.active {
            return Err(ControllerError::AlreadyActive(id));
        }

        let id = self.store.start_session()?;
        self.shared_state.store(Arc::new(ControllerSharedState {
            active_session: Some(id),
            ..Default::default()
        }));

        let store = self.store.clone();
        let shared_state = self.shared_state.clone();
        let on_sample = Box::new(move |sample: MiningStats| {
            let mut failure = None;
            if let Err(e) = store.update_stats(id, sample) {
                error!("Session {}: failed to record stats: {}", id, e);
                failure = Some(e.to_string());
            }
            if let Err(e) = store.add_snapshot(id, sample.hashes_per_second, sample.total_hashes) {
                error!("Session {}: failed to record snapshot: {}", id, e);
                failure = Some(e.to_string());
            }

            let old_state = shared_state.load();
            let mut new_state = (**old_state).clone();
            new_state.last_sample = Some(sample);
            new_state.samples_delivered += 1;
            if failure.is_some() {
                new_state.last_error = failure;
            }
            shared_state.store(Arc::new(new_state));
        });

        if let Err(e) = self.generator.start(on_sample) {
            error!("Failed to start generator, closing session {}: {}", id, e);
            if let Err(se) = self.store.stop_session(id) {
                error!("Failed to close session {}: {}", id, se);
            }
            self.shared_state.store(Arc::new(ControllerSharedState::default()));
            return Err(ControllerError::Spawn(e));
        }

        self.active = Some(id);
        info!("Mining session {} active", id);
        Ok(id)
    }

    /// Stops the generator, then closes the session. No-op while Idle.
    pub fn stop(&mut self) -> Result<(), ControllerError> {
        let Some(id) = self.active.take() else {
            return Ok(());
        };

        self.generator.stop();

        let result = self.store.stop_session(id);

        let old_state = self.shared_state.load();
        let mut new_state = (**old_state).clone();
        new_state.active_session = None;
        if let Err(e) = &result {
            new_state.last_error = Some(e.to_string());
        }
        self.shared_state.store(Arc::new(new_state));

        result?;
        info!("Mining session {} finished", id);
        Ok(())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop session on drop: {}", e);
        }
    }
}
