//! Handshake events and the journal time base

use crate::types::PeerId;
use std::fmt;
use std::time::Duration;

/// Point on the journal clock, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Saturates at `u64::MAX` nanoseconds (roughly year 2554).
    pub fn from_duration(d: Duration) -> Self {
        Self(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    pub fn saturating_add(&self, d: Duration) -> Timestamp {
        Timestamp::from_nanos(self.0.saturating_add(Timestamp::from_duration(d).0))
    }

    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0 / 1_000_000_000, self.0 % 1_000_000_000)
    }
}

/// A completed liveness handshake reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeEvent {
    /// When the handshake completed
    pub observed_at: Timestamp,
    /// Which peer completed it
    pub peer: PeerId,
    /// Measured round-trip time
    pub rtt: Duration,
}

impl HandshakeEvent {
    pub fn new(observed_at: Timestamp, peer: PeerId, rtt: Duration) -> Self {
        Self { observed_at, peer, rtt }
    }
}
