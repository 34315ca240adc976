//! Journal key and value encodings
//!
//! Key: timestamp (8 bytes, big-endian for sort) + peer public key (32 bytes).
//! Value: round-trip time in nanoseconds (8 bytes, big-endian).

use crate::StorageError;
use std::fmt;
use std::time::Duration;
use upd_model::{HandshakeEvent, PeerId, Timestamp, PEER_ID_LEN};

/// Encoded size of a `JournalKey`.
pub const KEY_LEN: usize = 8 + PEER_ID_LEN;

/// Encoded size of a `JournalRecord`.
pub const RECORD_LEN: usize = 8;

/// Sort key of the journal. Field order gives `(timestamp, peer)` ordering,
/// which is also the byte order of `encode()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JournalKey {
    pub timestamp: Timestamp,
    pub peer: PeerId,
}

impl JournalKey {
    pub fn new(timestamp: Timestamp, peer: PeerId) -> Self {
        Self { timestamp, peer }
    }

    pub fn encode(&self) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        key[..8].copy_from_slice(&self.timestamp.to_be_bytes());
        key[8..].copy_from_slice(self.peer.as_bytes());
        key
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() != KEY_LEN {
            return Err(StorageError::Corrupt(format!(
                "journal key has {} bytes, expected {}",
                bytes.len(),
                KEY_LEN
            )));
        }
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[..8]);
        let peer = PeerId::try_from(&bytes[8..])
            .map_err(|e| StorageError::Corrupt(format!("journal key peer: {}", e)))?;
        Ok(Self {
            timestamp: Timestamp::from_be_bytes(ts),
            peer,
        })
    }
}

impl From<&HandshakeEvent> for JournalKey {
    fn from(event: &HandshakeEvent) -> Self {
        Self::new(event.observed_at, event.peer)
    }
}

impl fmt::Display for JournalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.peer.short(), self.timestamp)
    }
}

/// Value stored per handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalRecord {
    pub rtt: Duration,
}

impl JournalRecord {
    pub fn new(rtt: Duration) -> Self {
        Self { rtt }
    }

    /// Round-trip time saturates at `u64::MAX` nanoseconds.
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        u64::try_from(self.rtt.as_nanos())
            .unwrap_or(u64::MAX)
            .to_be_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        let raw: [u8; RECORD_LEN] = bytes.try_into().map_err(|_| {
            StorageError::Corrupt(format!(
                "journal record has {} bytes, expected {}",
                bytes.len(),
                RECORD_LEN
            ))
        })?;
        Ok(Self {
            rtt: Duration::from_nanos(u64::from_be_bytes(raw)),
        })
    }
}

impl From<&HandshakeEvent> for JournalRecord {
    fn from(event: &HandshakeEvent) -> Self {
        Self::new(event.rtt)
    }
}
