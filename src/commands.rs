use serde::Serialize;

use crate::app_state::AppState;
use crate::domain::models::{MiningStats, OverallStats, Session, SessionId, StatSnapshot};
use crate::usecase::controller::ControllerSharedState;

/// Acknowledgement returned by mutating commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub success: bool,
}

const ACK: Ack = Ack { success: true };

pub fn start_session(state: &AppState) -> Result<SessionId, String> {
    state.store.start_session().map_err(|e| e.to_string())
}

pub fn stop_session(state: &AppState, session_id: SessionId) -> Result<Ack, String> {
    state.store.stop_session(session_id).map_err(|e| e.to_string())?;
    Ok(ACK)
}

pub fn update_stats(state: &AppState, session_id: SessionId, stats: MiningStats) -> Result<Ack, String> {
    state.store.update_stats(session_id, stats).map_err(|e| e.to_string())?;
    Ok(ACK)
}

pub fn add_snapshot(
    state: &AppState,
    session_id: SessionId,
    hashes_per_second: f64,
    total_hashes: u64,
) -> Result<Ack, String> {
    state
        .store
        .add_snapshot(session_id, hashes_per_second, total_hashes)
        .map_err(|e| e.to_string())?;
    Ok(ACK)
}

pub fn list_sessions(state: &AppState) -> Result<Vec<Session>, String> {
    state.store.list_sessions().map_err(|e| e.to_string())
}

pub fn list_snapshots(state: &AppState, session_id: SessionId) -> Result<Vec<StatSnapshot>, String> {
    state.store.list_snapshots(session_id).map_err(|e| e.to_string())
}

pub fn overall_stats(state: &AppState) -> Result<OverallStats, String> {
    state.store.overall_stats().map_err(|e| e.to_string())
}

pub fn start_mining(state: &AppState) -> Result<SessionId, String> {
    let mut controller = state
        .controller
        .lock()
        .map_err(|_| "Controller lock poisoned".to_string())?;
    controller.start().map_err(|e| e.to_string())
}

pub fn stop_mining(state: &AppState) -> Result<Ack, String> {
    let mut controller = state
        .controller
        .lock()
        .map_err(|_| "Controller lock poisoned".to_string())?;
    controller.stop().map_err(|e| e.to_string())?;
    Ok(ACK)
}

pub fn get_snapshot(state: &AppState) -> ControllerSharedState {
    let guard = state.shared_state.load();
    (**guard).clone()
}
