//! Liveness actor - single owner of the tracker
//!
//! Handshake consumers and the sweep loop all go through a `LivenessHandle`,
//! so every mutation of the per-peer map is applied in arrival order by one task.

use crate::tracker::{LivenessState, LivenessTracker, Transition};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use upd_model::{PeerId, Timestamp};

#[derive(Debug, Error)]
pub enum LivenessError {
    #[error("Liveness actor is closed")]
    Closed,
}

/// Liveness commands
pub enum LivenessCmd {
    RecordTime {
        peer: PeerId,
        time: Timestamp,
        resp: oneshot::Sender<Option<Transition>>,
    },
    SweepInactive {
        now: Timestamp,
        resp: oneshot::Sender<Vec<PeerId>>,
    },
    Seed {
        peers: Vec<PeerId>,
        now: Timestamp,
        resp: oneshot::Sender<()>,
    },
    State {
        peer: PeerId,
        resp: oneshot::Sender<Option<LivenessState>>,
    },
    Snapshot {
        resp: oneshot::Sender<Vec<(PeerId, LivenessState)>>,
    },
    Shutdown,
}

pub struct LivenessActor {
    tracker: LivenessTracker,
    rx: mpsc::Receiver<LivenessCmd>,
}

impl LivenessActor {
    pub fn new(tracker: LivenessTracker, rx: mpsc::Receiver<LivenessCmd>) -> Self {
        Self { tracker, rx }
    }

    /// Run until `Shutdown` or until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                LivenessCmd::RecordTime { peer, time, resp } => {
                    let _ = resp.send(self.tracker.record_time(peer, time));
                }
                LivenessCmd::SweepInactive { now, resp } => {
                    let _ = resp.send(self.tracker.sweep_inactive(now));
                }
                LivenessCmd::Seed { peers, now, resp } => {
                    self.tracker.seed(peers, now);
                    let _ = resp.send(());
                }
                LivenessCmd::State { peer, resp } => {
                    let _ = resp.send(self.tracker.state(&peer));
                }
                LivenessCmd::Snapshot { resp } => {
                    let _ = resp.send(self.tracker.snapshot());
                }
                LivenessCmd::Shutdown => break,
            }
        }
        debug!("Liveness actor stopped");
    }
}

/// Cloneable handle to a running `LivenessActor`.
#[derive(Clone, Debug)]
pub struct LivenessHandle {
    tx: mpsc::Sender<LivenessCmd>,
}

impl LivenessHandle {
    /// Spawn the actor for `tracker` on the current runtime.
    pub fn spawn(tracker: LivenessTracker) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(LivenessActor::new(tracker, rx).run());
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> LivenessCmd,
    ) -> Result<T, LivenessError> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .send(make(resp))
            .await
            .map_err(|_| LivenessError::Closed)?;
        rx.await.map_err(|_| LivenessError::Closed)
    }

    pub async fn record_time(
        &self,
        peer: PeerId,
        time: Timestamp,
    ) -> Result<Option<Transition>, LivenessError> {
        self.request(|resp| LivenessCmd::RecordTime { peer, time, resp }).await
    }

    pub async fn sweep_inactive(&self, now: Timestamp) -> Result<Vec<PeerId>, LivenessError> {
        self.request(|resp| LivenessCmd::SweepInactive { now, resp }).await
    }

    pub async fn seed(&self, peers: Vec<PeerId>, now: Timestamp) -> Result<(), LivenessError> {
        self.request(|resp| LivenessCmd::Seed { peers, now, resp }).await
    }

    pub async fn state(&self, peer: PeerId) -> Result<Option<LivenessState>, LivenessError> {
        self.request(|resp| LivenessCmd::State { peer, resp }).await
    }

    pub async fn snapshot(&self) -> Result<Vec<(PeerId, LivenessState)>, LivenessError> {
        self.request(|resp| LivenessCmd::Snapshot { resp }).await
    }

    /// Stop the actor. Requests already queued are answered first.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(LivenessCmd::Shutdown).await;
    }
}
