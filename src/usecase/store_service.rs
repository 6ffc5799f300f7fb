use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{error, info};
use std::thread::{self, JoinHandle};

use crate::domain::errors::StoreError;
use crate::domain::models::{MiningStats, OverallStats, Session, SessionId, StatSnapshot};
use crate::domain::repositories::MiningDataRepository;
use crate::usecase::session_store::SessionStore;

type Reply<T> = Sender<T>;

pub enum StoreCommand {
    StartSession(Reply<Result<SessionId, StoreError>>),
    StopSession(SessionId, Reply<Result<(), StoreError>>),
    UpdateStats(SessionId, MiningStats, Reply<Result<(), StoreError>>),
    AddSnapshot {
        session_id: SessionId,
        hashes_per_second: f64,
        total_hashes: u64,
        reply: Reply<Result<(), StoreError>>,
    },
    ListSessions(Reply<Vec<Session>>),
    ListSnapshots(SessionId, Reply<Vec<StatSnapshot>>),
    OverallStats(Reply<OverallStats>),
    GetSession(SessionId, Reply<Option<Session>>),
    RecoverInterrupted(Reply<Result<Vec<SessionId>, StoreError>>),
    Shutdown,
}

/// Owns the store and applies commands one at a time, in arrival order.
pub struct StoreService<R> {
    store: SessionStore<R>,
    command_rx: Receiver<StoreCommand>,
}

impl<R: MiningDataRepository> StoreService<R> {
    pub fn new(store: SessionStore<R>, command_rx: Receiver<StoreCommand>) -> Self {
        Self { store, command_rx }
    }

    // Reply send errors mean the caller gave up waiting; nothing to do.
    fn handle_command(&mut self, cmd: StoreCommand) {
        match cmd {
            StoreCommand::StartSession(reply) => {
                let _ = reply.send(self.store.start_session());
            }
            StoreCommand::StopSession(id, reply) => {
                let _ = reply.send(self.store.stop_session(id));
            }
            StoreCommand::UpdateStats(id, stats, reply) => {
                let _ = reply.send(self.store.update_stats(id, stats));
            }
            StoreCommand::AddSnapshot {
                session_id,
                hashes_per_second,
                total_hashes,
                reply,
            } => {
                let _ = reply.send(self.store.add_snapshot(
                    session_id,
                    hashes_per_second,
                    total_hashes,
                ));
            }
            StoreCommand::ListSessions(reply) => {
                let _ = reply.send(self.store.list_sessions());
            }
            StoreCommand::ListSnapshots(id, reply) => {
                let _ = reply.send(self.store.list_snapshots(id));
            }
            StoreCommand::OverallStats(reply) => {
                let _ = reply.send(self.store.overall_stats());
            }
            StoreCommand::GetSession(id, reply) => {
                let _ = reply.send(self.store.get_session(id));
            }
            StoreCommand::RecoverInterrupted(reply) => {
                let _ = reply.send(self.store.recover_interrupted_sessions());
            }
            StoreCommand::Shutdown => {}
        }
    }

    pub fn run(mut self) {
        info!("Store service started");

        // Ends on Shutdown or once every handle is dropped.
        while let Ok(cmd) = self.command_rx.recv() {
            if let StoreCommand::Shutdown = cmd {
                info!("Shutdown command received");
                break;
            }
            self.handle_command(cmd);
        }

        info!("Store service exiting");
        if let Err(e) = self.store.close() {
            error!("Store close failed: {}", e);
        }
    }
}

/// Cloneable front door to a running [`StoreService`].
///
/// Each call enqueues one command and blocks until the service has
/// applied it.
#[derive(Clone)]
pub struct StoreHandle {
    command_tx: Sender<StoreCommand>,
}

impl StoreHandle {
    pub fn new(command_tx: Sender<StoreCommand>) -> Self {
        Self { command_tx }
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> StoreCommand) -> Result<T, StoreError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.command_tx
            .send(make(reply_tx))
            .map_err(|_| StoreError::ServiceUnavailable)?;
        reply_rx.recv().map_err(|_| StoreError::ServiceUnavailable)
    }

    pub fn start_session(&self) -> Result<SessionId, StoreError> {
        self.request(StoreCommand::StartSession)?
    }

    pub fn stop_session(&self, id: SessionId) -> Result<(), StoreError> {
        self.request(|reply| StoreCommand::StopSession(id, reply))?
    }

    pub fn update_stats(&self, id: SessionId, stats: MiningStats) -> Result<(), StoreError> {
        self.request(|reply| StoreCommand::UpdateStats(id, stats, reply))?
    }

    pub fn add_snapshot(
        &self,
        session_id: SessionId,
        hashes_per_second: f64,
        total_hashes: u64,
    ) -> Result<(), StoreError> {
        self.request(|reply| StoreCommand::AddSnapshot {
            session_id,
            hashes_per_second,
            total_hashes,
            reply,
        })?
    }

    pub fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        self.request(StoreCommand::ListSessions)
    }

    pub fn list_snapshots(&self, session_id: SessionId) -> Result<Vec<StatSnapshot>, StoreError> {
        self.request(|reply| StoreCommand::ListSnapshots(session_id, reply))
    }

    pub fn overall_stats(&self) -> Result<OverallStats, StoreError> {
        self.request(StoreCommand::OverallStats)
    }

    pub fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        self.request(|reply| StoreCommand::GetSession(id, reply))
    }

    pub fn recover_interrupted_sessions(&self) -> Result<Vec<SessionId>, StoreError> {
        self.request(StoreCommand::RecoverInterrupted)?
    }

    /// Asks the service to flush and exit. Safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(StoreCommand::Shutdown);
    }
}

/// Starts the store on its own thread and returns a handle to it.
pub fn spawn_store_service<R>(
    store: SessionStore<R>,
) -> std::io::Result<(StoreHandle, JoinHandle<()>)>
where
    R: MiningDataRepository + 'static,
{
    let (command_tx, command_rx) = unbounded();
    let service = StoreService::new(store, command_rx);
    let join = thread::Builder::new()
        .name("session-store".to_string())
        .spawn(move || service.run())?;
    Ok((StoreHandle::new(command_tx), join))
}
