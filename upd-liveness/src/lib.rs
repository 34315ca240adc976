//! Peer liveness tracking
//!
//! `LivenessTracker` is the pure state machine: it remembers when each peer
//! last completed a handshake and reports edges between active and inactive.
//! `LivenessHandle` serialises access to one tracker through an actor task.

mod actor;
mod tracker;

pub use actor::{LivenessActor, LivenessCmd, LivenessError, LivenessHandle};
pub use tracker::{LivenessState, LivenessTracker, TrackerConfig, Transition, DEFAULT_INACTIVITY_THRESHOLD};
