//! upd Node
//!
//! Application layer of the heartbeat journal:
//! - **Monitor**: runs per-peer consumers and the inactivity sweep
//! - **HandshakeSource** / **HandshakeFeed**: where handshakes come from
//! - **Notifier**: where liveness edges go
//! - **config**: the peer list file
//! - **DataDir**: on-disk layout

pub mod config;
pub mod data_dir;
pub mod monitor;
pub mod notify;
pub mod source;

pub use config::{
    add_peer, edit_config, load_config, remove_peer, write_config, AddOutcome, AppConfig,
    ConfigError, PeerConfig,
};
pub use data_dir::DataDir;
pub use monitor::{Monitor, MonitorConfig, MonitorError};
pub use notify::{
    LogNotifier, Notifier, NotifyError, ScriptNotifier, WebhookNotifier, DEFAULT_WORKFLOW_ID,
};
pub use source::{FeedError, HandshakeFeed, HandshakeSource};

// Re-exports for binaries
pub use upd_journal::{FlushReport, JournalWriter, WriterConfig};
pub use upd_liveness::{TrackerConfig, Transition};
pub use upd_model::{Clock, HandshakeEvent, PeerId, SystemClock, Timestamp};
pub use upd_storage::{JournalStore, StorageError};
