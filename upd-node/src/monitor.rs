//! Monitor - wires handshake sources to the journal and the liveness tracker
//!
//! One task per peer source feeds both the `JournalWriter` and the
//! `LivenessHandle`. A sweep task periodically asks the tracker which peers
//! went silent. Liveness edges are queued for a single delivery task that
//! calls the configured `Notifier`, so a slow notifier never holds up
//! journaling or shutdown.

use crate::config::PeerConfig;
use crate::notify::Notifier;
use crate::source::HandshakeSource;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use upd_journal::{JournalWriter, WriterConfig, WriterError};
use upd_liveness::{LivenessError, LivenessHandle, LivenessTracker, TrackerConfig, Transition};
use upd_model::{Clock, HandshakeEvent, PeerId};
use upd_storage::JournalStore;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Journal writer error: {0}")]
    Writer(#[from] WriterError),
    #[error("Liveness error: {0}")]
    Liveness(#[from] LivenessError),
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between inactivity sweeps
    pub sweep_interval: Duration,
    pub writer: WriterConfig,
    pub tracker: TrackerConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(20),
            writer: WriterConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

/// Transitions waiting for the notifier beyond this are dropped.
const NOTIFY_QUEUE: usize = 256;

/// Shared by every task of a running monitor.
struct Shared {
    peers: HashMap<PeerId, PeerConfig>,
    writer: JournalWriter,
    liveness: LivenessHandle,
    clock: Arc<dyn Clock>,
    notes: mpsc::Sender<(PeerId, Transition)>,
}

impl Shared {
    /// Liveness is stamped with the local clock, the same one the sweep
    /// reads. The journal keeps the event's own observation time.
    async fn on_handshake(&self, event: HandshakeEvent) -> Result<(), MonitorError> {
        let transition = self.liveness.record_time(event.peer, self.clock.now()).await?;
        self.writer.record(event).await?;
        if let Some(transition) = transition {
            self.notify(event.peer, transition);
        }
        Ok(())
    }

    fn notify(&self, peer: PeerId, transition: Transition) {
        match self.notes.try_send((peer, transition)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Notification queue full, dropping {} for {}", transition, peer.short());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Notifier stopped, dropping {} for {}", transition, peer.short());
            }
        }
    }
}

pub struct Monitor {
    shared: Arc<Shared>,
    notifier: Arc<dyn Notifier>,
    notes: mpsc::Receiver<(PeerId, Transition)>,
    sweep_interval: Duration,
    shutdown_token: CancellationToken,
}

impl Monitor {
    /// Start the writer and liveness actors. Must be called inside a runtime.
    pub fn new(
        store: Arc<JournalStore>,
        peers: Vec<PeerConfig>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: MonitorConfig,
    ) -> Self {
        let writer = JournalWriter::spawn(store, config.writer);
        let liveness = LivenessHandle::spawn(LivenessTracker::new(config.tracker));
        let peers = peers.into_iter().map(|p| (p.public_key, p)).collect();
        let (notes_tx, notes) = mpsc::channel(NOTIFY_QUEUE);
        Self {
            shared: Arc::new(Shared { peers, writer, liveness, clock, notes: notes_tx }),
            notifier,
            notes,
            sweep_interval: config.sweep_interval,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn writer(&self) -> &JournalWriter {
        &self.shared.writer
    }

    pub fn liveness(&self) -> &LivenessHandle {
        &self.shared.liveness
    }

    /// Cancelling this token stops `run`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Consume `sources` until shutdown.
    ///
    /// Every configured peer starts active as of now. On shutdown the final
    /// journal window is flushed before this returns.
    pub async fn run<S>(self, sources: HashMap<PeerId, S>) -> Result<(), MonitorError>
    where
        S: HandshakeSource + 'static,
    {
        let shared = self.shared;
        let cancel = self.shutdown_token;
        let peer_ids: Vec<PeerId> = shared.peers.keys().copied().collect();
        shared.liveness.seed(peer_ids, shared.clock.now()).await?;
        info!("Monitoring {} peers", shared.peers.len());

        let mut tasks = JoinSet::new();
        for (peer, source) in sources {
            tasks.spawn(consume(peer, source, shared.clone(), cancel.clone()));
        }
        tasks.spawn(sweep(self.sweep_interval, shared.clone(), cancel.clone()));
        tasks.spawn(deliver(self.notes, self.notifier, shared.clone(), cancel.clone()));

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(MonitorError::from).and_then(|r| r);
            if let Err(e) = result {
                error!("Monitor task failed: {}", e);
                cancel.cancel();
                first_error.get_or_insert(e);
            }
        }

        info!("Monitor stopping, flushing journal");
        let closed = shared.writer.close().await;
        shared.liveness.shutdown().await;

        match first_error {
            Some(e) => Err(e),
            None => closed.map_err(MonitorError::from),
        }
    }
}

async fn consume<S: HandshakeSource>(
    peer: PeerId,
    mut source: S,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) -> Result<(), MonitorError> {
    debug!("Consuming handshakes for {}", peer.short());
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = source.next_event() => event,
        };
        match event {
            Some(event) => shared.on_handshake(event).await?,
            None => {
                debug!("Handshake source for {} ended", peer.short());
                break;
            }
        }
    }
    Ok(())
}

async fn sweep(
    interval: Duration,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) -> Result<(), MonitorError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for peer in shared.liveness.sweep_inactive(shared.clock.now()).await? {
                    shared.notify(peer, Transition::BecameInactive);
                }
            }
        }
    }
    Ok(())
}

/// Hands queued transitions to the notifier one at a time, in order.
/// A call still pending at shutdown is abandoned.
async fn deliver(
    mut notes: mpsc::Receiver<(PeerId, Transition)>,
    notifier: Arc<dyn Notifier>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) -> Result<(), MonitorError> {
    loop {
        let (peer, transition) = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            note = notes.recv() => match note {
                Some(note) => note,
                None => break,
            },
        };
        let Some(config) = shared.peers.get(&peer) else {
            warn!("No configuration for {}, not notifying {}", peer.short(), transition);
            continue;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Abandoning {} notification for {} on shutdown", transition, peer.short());
                break;
            }
            result = notifier.notify(config, transition) => {
                if let Err(e) = result {
                    warn!("Notifier failed for {} ({}): {}", peer.short(), transition, e);
                }
            }
        }
    }
    Ok(())
}
