use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::domain::errors::StoreError;
use crate::domain::models::{MiningDatabase, MiningStats, OverallStats, Session, SessionStatus};
use crate::domain::repositories::MiningDataRepository;
use crate::infrastructure::clock::ManualClock;
use crate::infrastructure::persistence::FileMiningDataRepository;
use crate::usecase::session_store::SessionStore;

// Mock Repository
#[derive(Clone, Default)]
struct MockRepository {
    data: Arc<RwLock<MiningDatabase>>,
    fail_saves: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
    fail_load: bool,
}

impl MiningDataRepository for MockRepository {
    fn load(&self) -> Result<MiningDatabase> {
        if self.fail_load {
            return Err(anyhow!("corrupt document"));
        }
        Ok(self.data.read().unwrap().clone())
    }

    fn save(&self, data: &MiningDatabase) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        *self.data.write().unwrap() = data.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

const T0: i64 = 1_700_000_000_000;

fn open_store(repo: &MockRepository) -> (SessionStore<MockRepository>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::from_millis(T0));
    let store = SessionStore::open(repo.clone(), clock.clone());
    (store, clock)
}

fn stats(rate: f64, total: u64, accepted: u64) -> MiningStats {
    MiningStats {
        hashes_per_second: rate,
        total_hashes: total,
        accepted_hashes: accepted,
    }
}

#[test]
fn test_start_session_is_durable_and_running() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);

    let id = store.start_session().unwrap();

    let persisted = repo.data.read().unwrap().clone();
    assert_eq!(persisted.sessions.len(), 1);
    let session = &persisted.sessions[0];
    assert_eq!(session.id, id);
    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(session.end_time, None);
    assert_eq!(session.total_hashes, 0);
    assert_eq!(session.accepted_hashes, 0);
    assert_eq!(session.hashes_per_second, 0.0);
}

#[test]
fn test_ids_strictly_increase_at_distinct_instants() {
    let repo = MockRepository::default();
    let (mut store, clock) = open_store(&repo);

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(store.start_session().unwrap());
        clock.advance_ms(1);
    }

    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    // Still readable as creation timestamps.
    assert_eq!(ids[0], T0 as u64);
}

#[test]
fn test_ids_unique_within_same_millisecond() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);

    let a = store.start_session().unwrap();
    let b = store.start_session().unwrap();
    store.add_snapshot(a, 100.0, 100).unwrap();
    store.add_snapshot(a, 100.0, 200).unwrap();

    assert!(a < b);
    let snaps = store.list_snapshots(a);
    assert!(snaps[0].id < snaps[1].id);
}

#[test]
fn test_ids_continue_after_reopen() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);
    let first = store.start_session().unwrap();
    drop(store);

    // Clock reads earlier than the persisted id; must not collide.
    let clock = Arc::new(ManualClock::from_millis(T0 - 10_000));
    let mut store = SessionStore::open(repo.clone(), clock);
    let second = store.start_session().unwrap();
    assert!(second > first);
}

#[test]
fn test_list_sessions_newest_first() {
    let repo = MockRepository::default();
    let (mut store, clock) = open_store(&repo);

    let a = store.start_session().unwrap();
    clock.advance_ms(5_000);
    let b = store.start_session().unwrap();
    // Created later but with an earlier start_time.
    clock.advance_ms(-20_000);
    let c = store.start_session().unwrap();

    let order: Vec<_> = store.list_sessions().iter().map(|s| s.id).collect();
    assert_eq!(order, vec![b, a, c]);
}

#[test]
fn test_list_sessions_tie_break_is_deterministic() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);

    let a = store.start_session().unwrap();
    let b = store.start_session().unwrap();
    let c = store.start_session().unwrap();

    let order: Vec<_> = store.list_sessions().iter().map(|s| s.id).collect();
    assert_eq!(order, vec![c, b, a]);
}

#[test]
fn test_list_snapshots_filters_and_sorts() {
    let repo = MockRepository::default();
    let (mut store, clock) = open_store(&repo);

    let a = store.start_session().unwrap();
    let b = store.start_session().unwrap();

    clock.advance_ms(1_000);
    store.add_snapshot(a, 150.0, 150).unwrap();
    clock.advance_ms(1_000);
    store.add_snapshot(b, 999.0, 999).unwrap();
    clock.advance_ms(1_000);
    store.add_snapshot(a, 300.0, 450).unwrap();

    let snaps = store.list_snapshots(a);
    assert_eq!(snaps.len(), 2);
    assert!(snaps.iter().all(|s| s.session_id == a));
    assert!(snaps.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(snaps[0].total_hashes, 150);
    assert_eq!(snaps[1].total_hashes, 450);
}

#[test]
fn test_stop_session_sets_end_time() {
    let repo = MockRepository::default();
    let (mut store, clock) = open_store(&repo);

    let id = store.start_session().unwrap();
    clock.advance_ms(60_000);
    store.stop_session(id).unwrap();

    let session = store.get_session(id).unwrap();
    assert_eq!(session.status, SessionStatus::Stopped);
    let end = session.end_time.expect("end_time set");
    assert!(end >= session.start_time);
    assert_eq!((end - session.start_time).num_seconds(), 60);
}

#[test]
fn test_stop_session_is_idempotent() {
    let repo = MockRepository::default();
    let (mut store, clock) = open_store(&repo);

    let id = store.start_session().unwrap();
    clock.advance_ms(1_000);
    store.stop_session(id).unwrap();
    let once = store.list_sessions();
    let saves = repo.saves.load(Ordering::SeqCst);

    clock.advance_ms(1_000);
    store.stop_session(id).unwrap();

    assert_eq!(store.list_sessions(), once);
    assert_eq!(repo.saves.load(Ordering::SeqCst), saves, "second stop must not write");
}

#[test]
fn test_unknown_ids_are_ignored() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);

    store.stop_session(12345).unwrap();
    store.update_stats(12345, stats(100.0, 100, 92)).unwrap();

    assert!(store.list_sessions().is_empty());
    assert_eq!(repo.saves.load(Ordering::SeqCst), 0);
}

#[test]
fn test_orphan_snapshot_round_trips() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);

    store.add_snapshot(777, 250.0, 250).unwrap();
    drop(store);

    let (store, _clock) = open_store(&repo);
    let snaps = store.list_snapshots(777);
    assert_eq!(snaps.len(), 1);
    assert_eq!(snaps[0].hashes_per_second, 250.0);
}

#[test]
fn test_overall_stats_empty_store() {
    let repo = MockRepository::default();
    let (store, _clock) = open_store(&repo);

    assert_eq!(
        store.overall_stats(),
        OverallStats {
            total_sessions: 0,
            total_hashes: 0,
            accepted_hashes: 0,
            avg_hash_rate: 0.0,
        }
    );
}

#[test]
fn test_overall_stats_two_sessions() {
    let repo = MockRepository::default();
    let (mut store, clock) = open_store(&repo);

    let a = store.start_session().unwrap();
    store.update_stats(a, stats(200.0, 1000, 920)).unwrap();
    clock.advance_ms(1);
    let b = store.start_session().unwrap();
    store.update_stats(b, stats(400.0, 2000, 1840)).unwrap();

    let overall = store.overall_stats();
    assert_eq!(overall.total_sessions, 2);
    assert_eq!(overall.total_hashes, 3000);
    assert_eq!(overall.accepted_hashes, 2760);
    assert_eq!(overall.avg_hash_rate, 300.0);
}

#[test]
fn test_overall_stats_saturates_on_huge_counters() {
    let repo = MockRepository::default();
    let (mut store, clock) = open_store(&repo);

    let a = store.start_session().unwrap();
    store
        .update_stats(a, stats(100.0, u64::MAX - 10, u64::MAX - 10))
        .unwrap();
    clock.advance_ms(1);
    let b = store.start_session().unwrap();
    store.update_stats(b, stats(100.0, 100, 100)).unwrap();

    let overall = store.overall_stats();
    assert_eq!(overall.total_sessions, 2);
    assert_eq!(overall.total_hashes, u64::MAX);
    assert_eq!(overall.accepted_hashes, u64::MAX);
    assert_eq!(overall.avg_hash_rate, 100.0);
}

#[test]
fn test_overall_stats_counts_sessions_without_rate_as_zero() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);

    let a = store.start_session().unwrap();
    store.update_stats(a, stats(300.0, 300, 276)).unwrap();
    store.start_session().unwrap();

    assert_eq!(store.overall_stats().avg_hash_rate, 150.0);
}

#[test]
fn test_session_lifecycle_scenario() {
    let repo = MockRepository::default();
    let (mut store, clock) = open_store(&repo);

    let id = store.start_session().unwrap();
    for (rate, total) in [(150.0, 150), (300.0, 450), (450.0, 900)] {
        clock.advance_ms(1_000);
        store.add_snapshot(id, rate, total).unwrap();
    }

    let snaps = store.list_snapshots(id);
    let got: Vec<(f64, u64)> = snaps.iter().map(|s| (s.hashes_per_second, s.total_hashes)).collect();
    assert_eq!(got, vec![(150.0, 150), (300.0, 450), (450.0, 900)]);

    store.update_stats(id, stats(450.0, 900, 828)).unwrap();
    store.stop_session(id).unwrap();

    let session = store.get_session(id).unwrap();
    assert_eq!(session.total_hashes, 900);
    assert_eq!(session.status, SessionStatus::Stopped);
}

#[test]
fn test_accepted_above_total_is_clamped() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);

    let id = store.start_session().unwrap();
    store.update_stats(id, stats(100.0, 100, 150)).unwrap();

    let session = store.get_session(id).unwrap();
    assert_eq!(session.accepted_hashes, 100);
    assert!(session.accepted_hashes <= session.total_hashes);
}

#[test]
fn test_counter_regression_rejected() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);

    let id = store.start_session().unwrap();
    store.update_stats(id, stats(300.0, 900, 828)).unwrap();

    let err = store.update_stats(id, stats(100.0, 500, 460)).unwrap_err();
    assert!(matches!(
        err,
        StoreError::CounterRegression { field: "total_hashes", current: 900, requested: 500, .. }
    ));

    let session = store.get_session(id).unwrap();
    assert_eq!(session.total_hashes, 900);
    assert_eq!(session.hashes_per_second, 300.0);
}

#[test]
fn test_accepted_regression_rejected_without_write() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);

    let id = store.start_session().unwrap();
    store.update_stats(id, stats(300.0, 900, 828)).unwrap();
    let saves = repo.saves.load(Ordering::SeqCst);

    let err = store.update_stats(id, stats(300.0, 900, 800)).unwrap_err();
    assert!(matches!(
        err,
        StoreError::CounterRegression { field: "accepted_hashes", current: 828, requested: 800, .. }
    ));
    assert_eq!(repo.saves.load(Ordering::SeqCst), saves);

    let session = store.get_session(id).unwrap();
    assert_eq!(session.accepted_hashes, 828);
    assert_eq!(repo.data.read().unwrap().sessions[0].accepted_hashes, 828);
}

#[test]
fn test_update_stats_applies_to_stopped_session() {
    let repo = MockRepository::default();
    let (mut store, clock) = open_store(&repo);

    let id = store.start_session().unwrap();
    store.update_stats(id, stats(200.0, 400, 368)).unwrap();
    clock.advance_ms(5_000);
    store.stop_session(id).unwrap();
    let end_time = store.get_session(id).unwrap().end_time;

    store.update_stats(id, stats(250.0, 500, 460)).unwrap();

    let session = store.get_session(id).unwrap();
    assert_eq!(session.status, SessionStatus::Stopped);
    assert_eq!(session.end_time, end_time);
    assert_eq!(session.hashes_per_second, 250.0);
    assert_eq!(session.total_hashes, 500);
    assert_eq!(session.accepted_hashes, 460);

    let stored = repo.data.read().unwrap().sessions[0].clone();
    assert_eq!(stored.total_hashes, 500);
    assert_eq!(stored.status, SessionStatus::Stopped);
}

#[test]
fn test_exhausted_ids_are_reported_not_reused() {
    let start = DateTime::<Utc>::from_timestamp_millis(T0).unwrap();
    let repo = MockRepository::default();
    repo.data
        .write()
        .unwrap()
        .sessions
        .push(Session::new(u64::MAX, start));
    let (mut store, _clock) = open_store(&repo);
    assert_eq!(store.list_sessions().len(), 1);

    assert!(matches!(
        store.start_session(),
        Err(StoreError::IdsExhausted("session"))
    ));
    assert_eq!(store.list_sessions().len(), 1);
    assert_eq!(repo.saves.load(Ordering::SeqCst), 0);
}

#[test]
fn test_invalid_rate_rejected() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);

    let id = store.start_session().unwrap();
    assert!(matches!(
        store.update_stats(id, stats(f64::NAN, 10, 9)),
        Err(StoreError::InvariantViolation { .. })
    ));
    assert!(matches!(
        store.add_snapshot(id, -1.0, 10),
        Err(StoreError::InvariantViolation { .. })
    ));
    assert!(store.list_snapshots(id).is_empty());
}

#[test]
fn test_write_failure_is_reported_and_state_unchanged() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);

    let id = store.start_session().unwrap();
    repo.fail_saves.store(true, Ordering::SeqCst);

    assert!(matches!(store.start_session(), Err(StoreError::Persist(_))));
    assert!(matches!(
        store.update_stats(id, stats(100.0, 100, 92)),
        Err(StoreError::Persist(_))
    ));
    assert!(matches!(store.stop_session(id), Err(StoreError::Persist(_))));

    // Readers see the pre-mutation state only.
    let sessions = store.list_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].total_hashes, 0);
    assert_eq!(sessions[0].status, SessionStatus::Running);

    repo.fail_saves.store(false, Ordering::SeqCst);
    store.stop_session(id).unwrap();
    assert_eq!(store.get_session(id).unwrap().status, SessionStatus::Stopped);
}

#[test]
fn test_load_failure_starts_empty() {
    let repo = MockRepository {
        fail_load: true,
        ..Default::default()
    };
    let (mut store, _clock) = open_store(&repo);

    assert!(store.list_sessions().is_empty());
    store.start_session().unwrap();
    assert_eq!(store.list_sessions().len(), 1);
}

#[test]
fn test_concurrent_running_sessions_are_supported() {
    let repo = MockRepository::default();
    let (mut store, _clock) = open_store(&repo);

    let a = store.start_session().unwrap();
    let b = store.start_session().unwrap();

    let running = store
        .list_sessions()
        .iter()
        .filter(|s| s.status == SessionStatus::Running)
        .count();
    assert_eq!(running, 2);

    store.stop_session(a).unwrap();
    assert_eq!(store.get_session(b).unwrap().status, SessionStatus::Running);
}

#[test]
fn test_recover_interrupted_sessions() {
    let repo = MockRepository::default();
    let (mut store, clock) = open_store(&repo);

    let with_snaps = store.start_session().unwrap();
    clock.advance_ms(2_000);
    store.add_snapshot(with_snaps, 200.0, 200).unwrap();
    let last_snapshot = store.list_snapshots(with_snaps)[0].timestamp;
    let bare = store.start_session().unwrap();
    let done = store.start_session().unwrap();
    store.stop_session(done).unwrap();
    let done_before = store.get_session(done).unwrap();
    drop(store);

    // Simulated restart after a crash.
    clock.advance_ms(60_000);
    let mut store = SessionStore::open(repo.clone(), clock.clone());
    let mut recovered = store.recover_interrupted_sessions().unwrap();
    recovered.sort();
    assert_eq!(recovered, vec![with_snaps, bare]);

    let s = store.get_session(with_snaps).unwrap();
    assert_eq!(s.status, SessionStatus::Stopped);
    assert_eq!(s.end_time, Some(last_snapshot));

    let s = store.get_session(bare).unwrap();
    assert_eq!(s.end_time, Some(s.start_time));

    assert_eq!(store.get_session(done).unwrap(), done_before);
    assert!(store.recover_interrupted_sessions().unwrap().is_empty());
}

#[test]
fn test_round_trip_through_file_repository() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mining-data.json");
    let clock = Arc::new(ManualClock::from_millis(T0));

    let mut store = SessionStore::open(FileMiningDataRepository::new(&path), clock.clone());
    let a = store.start_session().unwrap();
    clock.advance_ms(1_000);
    store.add_snapshot(a, 321.5, 321).unwrap();
    store.update_stats(a, stats(321.5, 321, 295)).unwrap();
    clock.advance_ms(1_000);
    store.stop_session(a).unwrap();
    let b = store.start_session().unwrap();
    store.add_snapshot(b, 111.0, 111).unwrap();
    store.add_snapshot(9_999, 1.0, 1).unwrap();

    let sessions_before = store.list_sessions();
    let snaps_before = (store.list_snapshots(a), store.list_snapshots(b), store.list_snapshots(9_999));
    store.close().unwrap();

    let store = SessionStore::open(FileMiningDataRepository::new(&path), clock);
    assert_eq!(store.list_sessions(), sessions_before);
    assert_eq!(
        (store.list_snapshots(a), store.list_snapshots(b), store.list_snapshots(9_999)),
        snaps_before
    );
}

#[test]
fn test_corrupt_file_is_set_aside_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mining-data.json");
    std::fs::write(&path, "{\"sessions\": [").unwrap();

    let clock = Arc::new(ManualClock::from_millis(T0));
    let mut store = SessionStore::open(FileMiningDataRepository::new(&path), clock);
    assert!(store.list_sessions().is_empty());

    store.start_session().unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().any(|n| n.starts_with("mining-data.json.corrupt-")));
    assert!(names.iter().any(|n| n == "mining-data.json"));
}
