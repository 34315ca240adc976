//! LivenessTracker - active/inactive state per peer

use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use upd_model::{PeerId, Timestamp};

/// Silence after which an active peer is declared inactive.
pub const DEFAULT_INACTIVITY_THRESHOLD: Duration = Duration::from_secs(240);

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub inactivity_threshold: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { inactivity_threshold: DEFAULT_INACTIVITY_THRESHOLD }
    }
}

/// Edge between liveness states, reported exactly once per change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Transition {
    #[serde(rename = "active")]
    BecameActive,
    #[serde(rename = "inactive")]
    BecameInactive,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::BecameActive => "active",
            Transition::BecameInactive => "inactive",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessState {
    pub active: bool,
    pub last_active_at: Timestamp,
}

#[derive(Debug, Default)]
pub struct LivenessTracker {
    config: TrackerConfig,
    peers: HashMap<PeerId, LivenessState>,
}

impl LivenessTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config, peers: HashMap::new() }
    }

    pub fn threshold(&self) -> Duration {
        self.config.inactivity_threshold
    }

    /// Mark every peer in `peers` active as of `now` unless already known.
    /// Seeded peers that never handshake go inactive after one threshold.
    pub fn seed(&mut self, peers: impl IntoIterator<Item = PeerId>, now: Timestamp) {
        for peer in peers {
            self.peers.entry(peer).or_insert(LivenessState {
                active: true,
                last_active_at: now,
            });
        }
        debug!("Seeded liveness for {} peers", self.peers.len());
    }

    /// Record a handshake from `peer` at `time`.
    ///
    /// Returns `BecameActive` only when the peer was inactive. A first sighting
    /// starts the peer active without a transition.
    pub fn record_time(&mut self, peer: PeerId, time: Timestamp) -> Option<Transition> {
        match self.peers.entry(peer) {
            Entry::Vacant(slot) => {
                slot.insert(LivenessState { active: true, last_active_at: time });
                debug!("First handshake from {} at {}", peer.short(), time);
                None
            }
            Entry::Occupied(mut slot) => {
                let state = slot.get_mut();
                state.last_active_at = state.last_active_at.max(time);
                if state.active {
                    None
                } else {
                    state.active = true;
                    info!("Peer {} is active again", peer.short());
                    Some(Transition::BecameActive)
                }
            }
        }
    }

    /// Flip every active peer silent for longer than the threshold to
    /// inactive and return them. Peers already inactive are not returned.
    pub fn sweep_inactive(&mut self, now: Timestamp) -> Vec<PeerId> {
        let threshold = self.config.inactivity_threshold;
        let mut flipped: Vec<PeerId> = self
            .peers
            .iter_mut()
            .filter(|(_, state)| {
                state.active && now.saturating_duration_since(state.last_active_at) > threshold
            })
            .map(|(peer, state)| {
                state.active = false;
                *peer
            })
            .collect();
        flipped.sort();
        for peer in &flipped {
            info!("Peer {} went inactive", peer.short());
        }
        flipped
    }

    pub fn state(&self, peer: &PeerId) -> Option<LivenessState> {
        self.peers.get(peer).copied()
    }

    /// Every known peer with its state, ordered by peer.
    pub fn snapshot(&self) -> Vec<(PeerId, LivenessState)> {
        let mut all: Vec<_> = self.peers.iter().map(|(p, s)| (*p, *s)).collect();
        all.sort_by_key(|(p, _)| *p);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: PeerId = PeerId([1u8; 32]);
    const Q: PeerId = PeerId([2u8; 32]);

    fn at(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_inactive_reported_once_then_reactivated() {
        let mut tracker = LivenessTracker::default();
        assert_eq!(tracker.record_time(P, at(0)), None);

        assert_eq!(tracker.sweep_inactive(at(300)), vec![P]);
        assert_eq!(tracker.sweep_inactive(at(320)), Vec::<PeerId>::new());
        assert!(!tracker.state(&P).unwrap().active);

        assert_eq!(tracker.record_time(P, at(325)), Some(Transition::BecameActive));
        assert_eq!(tracker.record_time(P, at(326)), None);
        assert!(tracker.state(&P).unwrap().active);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut tracker = LivenessTracker::default();
        tracker.record_time(P, at(10));
        assert!(tracker.sweep_inactive(at(250)).is_empty());
        assert_eq!(tracker.sweep_inactive(at(250).saturating_add(Duration::from_nanos(1))), vec![P]);
    }

    #[test]
    fn test_last_active_never_moves_backwards() {
        let mut tracker = LivenessTracker::default();
        tracker.record_time(P, at(100));
        tracker.record_time(P, at(40));
        assert_eq!(tracker.state(&P).unwrap().last_active_at, at(100));

        // The late sample does not pull the deadline earlier
        assert!(tracker.sweep_inactive(at(300)).is_empty());
    }

    #[test]
    fn test_sweep_only_reports_silent_peers() {
        let mut tracker = LivenessTracker::new(TrackerConfig {
            inactivity_threshold: Duration::from_secs(10),
        });
        tracker.record_time(P, at(0));
        tracker.record_time(Q, at(0));
        tracker.record_time(Q, at(15));

        assert_eq!(tracker.sweep_inactive(at(20)), vec![P]);
        assert_eq!(tracker.sweep_inactive(at(30)), vec![Q]);
        assert!(tracker.sweep_inactive(at(40)).is_empty());
    }

    #[test]
    fn test_seed_keeps_known_peers() {
        let mut tracker = LivenessTracker::default();
        tracker.record_time(P, at(50));
        tracker.seed([P, Q], at(10));

        assert_eq!(tracker.state(&P).unwrap().last_active_at, at(50));
        assert_eq!(tracker.state(&Q).unwrap(), LivenessState { active: true, last_active_at: at(10) });
        let peers: Vec<_> = tracker.snapshot().into_iter().map(|(p, _)| p).collect();
        assert_eq!(peers, vec![P, Q]);
    }

    #[test]
    fn test_transition_text() {
        assert_eq!(Transition::BecameInactive.to_string(), "inactive");
        assert_eq!(serde_json::to_string(&Transition::BecameActive).unwrap(), "\"active\"");
    }
}
