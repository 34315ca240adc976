//! Data directory management
//!
//! Everything the daemon persists lives under one base directory:
//! - `system-uptime.redb`: handshake journal
//! - `peer-config.json`: configured peers

use std::path::{Path, PathBuf};
use upd_storage::JOURNAL_FILE;

const APP_DIR: &str = ".upd";
const PEER_CONFIG_FILE: &str = "peer-config.json";

#[derive(Debug, Clone)]
pub struct DataDir {
    base: PathBuf,
}

impl DataDir {
    /// Create a DataDir with a custom base path.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `~/.upd`, or `None` when the home directory is unknown.
    pub fn default_location() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(APP_DIR)))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory handed to `JournalStore::open`.
    pub fn journal_dir(&self) -> &Path {
        &self.base
    }

    /// Path of the journal file itself.
    pub fn journal_file(&self) -> PathBuf {
        self.base.join(JOURNAL_FILE)
    }

    pub fn peer_config(&self) -> PathBuf {
        self.base.join(PEER_CONFIG_FILE)
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)
    }
}
