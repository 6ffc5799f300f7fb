use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::models::{AppConfig, MiningDatabase, CURRENT_SCHEMA_VERSION};
use crate::domain::repositories::MiningDataRepository;
use crate::infrastructure::atomic_file::write_json_atomic;

const APP_NAME: &str = "MiningTracker";
pub const DATA_FILE_NAME: &str = "mining-data.json";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const LOG_FILE_NAME: &str = "mining-tracker.log";

fn project_dirs() -> Option<directories::ProjectDirs> {
    // Empty qualifier/org keeps the paths short: %LOCALAPPDATA%\MiningTracker, ~/.local/share/MiningTracker
    directories::ProjectDirs::from("", "", APP_NAME)
}

fn fallback_path(file_name: &str) -> Result<PathBuf> {
    let mut path = std::env::current_dir().context("Failed to get current dir")?;
    path.push(file_name);
    Ok(path)
}

/// Default location of the data document.
///
/// Windows: %LOCALAPPDATA%\MiningTracker\mining-data.json
/// Linux:   $XDG_DATA_HOME/MiningTracker/mining-data.json (or ~/.local/share/...)
pub fn default_data_path() -> Result<PathBuf> {
    match project_dirs() {
        Some(dirs) => Ok(dirs.data_dir().join(DATA_FILE_NAME)),
        None => fallback_path(DATA_FILE_NAME),
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    match project_dirs() {
        Some(dirs) => Ok(dirs.config_dir().join(CONFIG_FILE_NAME)),
        None => fallback_path(CONFIG_FILE_NAME),
    }
}

pub struct FileMiningDataRepository {
    path: PathBuf,
}

impl FileMiningDataRepository {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MiningDataRepository for FileMiningDataRepository {
    fn load(&self) -> Result<MiningDatabase> {
        if !self.path.exists() {
            return Ok(MiningDatabase::default());
        }

        let file = fs::File::open(&self.path)
            .context(format!("Failed to open data file: {:?}", self.path))?;
        let reader = std::io::BufReader::new(file);
        let data: MiningDatabase =
            serde_json::from_reader(reader).context("Failed to parse data file")?;

        if data.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(anyhow!(
                "Schema version mismatch: supported up to {}, found {}",
                CURRENT_SCHEMA_VERSION,
                data.schema_version
            ));
        }

        Ok(data)
    }

    fn save(&self, data: &MiningDatabase) -> Result<()> {
        write_json_atomic(&self.path, data)
    }

    fn quarantine(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DATA_FILE_NAME.to_string());
        let target = self.path.with_file_name(format!(
            "{}.corrupt-{}",
            file_name,
            Utc::now().timestamp_millis()
        ));

        fs::rename(&self.path, &target)
            .context(format!("Failed to move unreadable data file to {:?}", target))?;
        warn!("Moved unreadable data file to {:?}", target);
        Ok(Some(target))
    }
}

pub trait ConfigRepository {
    fn load(&self) -> Result<AppConfig>;
    fn save(&self, config: &AppConfig) -> Result<()>;
}

pub struct FileConfigRepository {
    path: PathBuf,
}

impl FileConfigRepository {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Loads the config, falling back to defaults on any failure.
    pub fn load_or_default(&self) -> AppConfig {
        match self.load() {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Failed to load config, using defaults: {:#}", e);
                AppConfig::default()
            }
        }
    }
}

impl ConfigRepository for FileConfigRepository {
    fn load(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            info!("No config file at {:?}, using defaults", self.path);
            return Ok(AppConfig::default());
        }

        let file = fs::File::open(&self.path)
            .context(format!("Failed to open config file: {:?}", self.path))?;
        let reader = std::io::BufReader::new(file);
        let config: AppConfig =
            serde_json::from_reader(reader).context("Failed to parse config file")?;

        config
            .validate()
            .map_err(|e| anyhow!("Invalid config {:?}: {}", self.path, e))?;

        Ok(config)
    }

    fn save(&self, config: &AppConfig) -> Result<()> {
        write_json_atomic(&self.path, config)
    }
}
