//! Strong types for peer identities
//!
//! `PeerId` wraps the 32-byte tunnel public key. Its textual form is standard
//! base64, the way tunnel tooling prints keys.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fmt;
use std::str::FromStr;

/// Length of a peer public key in bytes.
pub const PEER_ID_LEN: usize = 32;

/// Error returned when parsing a `PeerId` from text or bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerIdError {
    #[error("invalid base64: {0}")]
    Base64(String),
    #[error("expected 32 bytes, got {0}")]
    Length(usize),
}

/// 32-byte public key identifying a peer.
///
/// Ordering is bytewise, which is the tiebreak order used by journal keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PeerId(pub [u8; PEER_ID_LEN]);

impl PeerId {
    /// Returns the inner bytes.
    pub fn as_bytes(&self) -> &[u8; PEER_ID_LEN] {
        &self.0
    }

    /// Parse from a base64 string.
    pub fn from_base64(encoded: &str) -> Result<Self, PeerIdError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| PeerIdError::Base64(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }

    /// Encode as standard base64.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// First eight base64 characters, for compact log lines.
    pub fn short(&self) -> String {
        self.to_base64()[..8].to_string()
    }
}

impl From<[u8; PEER_ID_LEN]> for PeerId {
    fn from(bytes: [u8; PEER_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<PeerId> for [u8; PEER_ID_LEN] {
    fn from(id: PeerId) -> [u8; PEER_ID_LEN] {
        id.0
    }
}

impl TryFrom<&[u8]> for PeerId {
    type Error = PeerIdError;
    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        <[u8; PEER_ID_LEN]>::try_from(slice)
            .map(Self)
            .map_err(|_| PeerIdError::Length(slice.len()))
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for PeerId {
    type Err = PeerIdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.to_base64())
    }
}

impl serde::Serialize for PeerId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> serde::Deserialize<'de> for PeerId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_display() {
        let id = PeerId([0u8; 32]);
        let expected = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
        assert_eq!(id.to_string(), expected);
        assert_eq!(format!("{:?}", id), format!("PeerId({})", expected));
        assert_eq!(id.short(), "AAAAAAAA");
    }

    #[test]
    fn test_parse() {
        let id = PeerId([7u8; 32]);
        let parsed: PeerId = id.to_base64().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        // 16 bytes of zeros
        let err = PeerId::from_base64("AAAAAAAAAAAAAAAAAAAAAA==").unwrap_err();
        assert_eq!(err, PeerIdError::Length(16));
        assert!(matches!(PeerId::from_base64("not base64!"), Err(PeerIdError::Base64(_))));
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let mut low = [0u8; 32];
        low[31] = 1;
        let mut high = [0u8; 32];
        high[0] = 1;
        assert!(PeerId(low) < PeerId(high));
    }

    #[test]
    fn test_serde_as_string() {
        let id = PeerId([1u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_base64()));
        let back: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
