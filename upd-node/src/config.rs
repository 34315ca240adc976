//! Peer configuration file
//!
//! `peer-config.json` holds the peers the daemon watches:
//!
//! ```json
//! { "peers": [ { "publicKey": "<base64>", "ipAddress": "10.0.0.2", "port": 51820, "keepAlive": 25 } ] }
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};
use upd_model::{PeerId, PeerIdError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid public key: {0}")]
    Key(#[from] PeerIdError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfig {
    pub public_key: PeerId,
    pub ip_address: String,
    pub port: u16,
    /// Keep-alive interval in seconds
    pub keep_alive: u64,
}

impl PeerConfig {
    /// Build from a textual public key, as given on the command line.
    pub fn parse(
        public_key: &str,
        ip_address: impl Into<String>,
        port: u16,
        keep_alive: u64,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            public_key: PeerId::from_base64(public_key)?,
            ip_address: ip_address.into(),
            port,
            keep_alive,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

impl AppConfig {
    pub fn peer(&self, key: &PeerId) -> Option<&PeerConfig> {
        self.peers.iter().find(|p| p.public_key == *key)
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.iter().map(|p| p.public_key).collect()
    }
}

/// What `add_peer` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Overwritten,
    AlreadyPresent,
}

/// Load the config at `path`, creating an empty `{}` file if none exists.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"{}")?;
        info!("Created empty peer config at {}", path.display());
    }
    let data = std::fs::read(path)?;
    let config: AppConfig = serde_json::from_slice(&data)?;
    debug!("Loaded {} peers from {}", config.peers.len(), path.display());
    Ok(config)
}

/// Write `config` as pretty JSON. The file is replaced atomically.
pub fn write_config(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    let json = serde_json::to_vec_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load, modify and write back the config at `path`.
pub fn edit_config<T>(
    path: &Path,
    modify: impl FnOnce(&mut AppConfig) -> T,
) -> Result<T, ConfigError> {
    let mut config = load_config(path)?;
    let out = modify(&mut config);
    write_config(&config, path)?;
    Ok(out)
}

pub fn add_peer(path: &Path, peer: PeerConfig, overwrite: bool) -> Result<AddOutcome, ConfigError> {
    edit_config(path, |cfg| {
        match cfg.peers.iter_mut().find(|p| p.public_key == peer.public_key) {
            Some(existing) if overwrite => {
                *existing = peer;
                AddOutcome::Overwritten
            }
            Some(_) => AddOutcome::AlreadyPresent,
            None => {
                cfg.peers.push(peer);
                AddOutcome::Added
            }
        }
    })
}

/// Remove the peer with `key`. Returns whether it was present.
pub fn remove_peer(path: &Path, key: &PeerId) -> Result<bool, ConfigError> {
    edit_config(path, |cfg| {
        let before = cfg.peers.len();
        cfg.peers.retain(|p| p.public_key != *key);
        cfg.peers.len() != before
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn peer(byte: u8, port: u16) -> PeerConfig {
        PeerConfig {
            public_key: PeerId([byte; 32]),
            ip_address: "10.0.0.2".into(),
            port,
            keep_alive: 25,
        }
    }

    #[test]
    fn test_load_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("peer-config.json");

        let cfg = load_config(&path).unwrap();
        assert!(cfg.peers.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_camel_case_keys() {
        let json = serde_json::to_value(peer(0, 51820)).unwrap();
        assert_eq!(json["publicKey"], "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");
        assert_eq!(json["ipAddress"], "10.0.0.2");
        assert_eq!(json["port"], 51820);
        assert_eq!(json["keepAlive"], 25);
    }

    #[test]
    fn test_add_and_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("peer-config.json");

        assert_eq!(add_peer(&path, peer(1, 1000), false).unwrap(), AddOutcome::Added);
        assert_eq!(add_peer(&path, peer(1, 2000), false).unwrap(), AddOutcome::AlreadyPresent);
        assert_eq!(load_config(&path).unwrap().peers[0].port, 1000);

        assert_eq!(add_peer(&path, peer(1, 2000), true).unwrap(), AddOutcome::Overwritten);
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.peers.len(), 1);
        assert_eq!(cfg.peer(&PeerId([1u8; 32])).unwrap().port, 2000);
    }

    #[test]
    fn test_remove_reports_presence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("peer-config.json");
        add_peer(&path, peer(1, 1), false).unwrap();
        add_peer(&path, peer(2, 2), false).unwrap();

        assert!(remove_peer(&path, &PeerId([1u8; 32])).unwrap());
        assert!(!remove_peer(&path, &PeerId([1u8; 32])).unwrap());
        assert_eq!(load_config(&path).unwrap().peer_ids(), vec![PeerId([2u8; 32])]);
        assert!(!dir.path().join("peer-config.json.tmp").exists());
    }

    #[test]
    fn test_parse_rejects_bad_key() {
        assert!(matches!(
            PeerConfig::parse("short", "1.2.3.4", 1, 1),
            Err(ConfigError::Key(_))
        ));
    }
}
