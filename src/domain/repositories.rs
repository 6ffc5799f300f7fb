use crate::domain::models::MiningDatabase;
use anyhow::Result;
use std::path::PathBuf;

pub trait MiningDataRepository: Send {
    /// Loads the whole document. A missing document is an empty database.
    fn load(&self) -> Result<MiningDatabase>;

    /// Replaces the whole document. Must be atomic from a reader's view.
    fn save(&self, data: &MiningDatabase) -> Result<()>;

    /// Moves an unreadable document out of the way so a reset cannot
    /// overwrite it. Returns where it went, if anywhere.
    fn quarantine(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}
