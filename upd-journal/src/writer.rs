//! JournalWriter - handle and actor for windowed journal appends

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use upd_model::HandshakeEvent;
use upd_storage::{JournalKey, JournalRecord, JournalStore, StorageError};

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("Journal writer is closed")]
    Closed,
}

/// Tunables for the writer actor.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Fixed delay between the first event of a window and its flush
    pub window: Duration,
    /// Capacity of the command channel
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(1),
            channel_capacity: 1024,
        }
    }
}

/// Outcome of one flushed window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub committed: usize,
    pub skipped: usize,
}

enum WriterCmd {
    Record(HandshakeEvent),
    Close { resp: oneshot::Sender<()> },
}

/// Cloneable handle to the writer actor.
#[derive(Clone)]
pub struct JournalWriter {
    tx: mpsc::Sender<WriterCmd>,
    reports: broadcast::Sender<FlushReport>,
    shutdown_token: CancellationToken,
}

impl std::fmt::Debug for JournalWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalWriter")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

/// The writer actor, not yet running. Spawn `run()` on the runtime.
pub struct WriterRunner {
    actor: WriterActor,
    shutdown_token: CancellationToken,
}

impl WriterRunner {
    pub async fn run(self) {
        self.actor.run(self.shutdown_token).await;
    }
}

impl JournalWriter {
    /// Create a handle and the actor that serves it.
    pub fn new(store: Arc<JournalStore>, config: WriterConfig) -> (Self, WriterRunner) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let (reports, _) = broadcast::channel(64);
        let shutdown_token = CancellationToken::new();

        let actor = WriterActor {
            store,
            rx,
            window: config.window,
            batch: Vec::new(),
            deadline: None,
            reports: reports.clone(),
        };
        let runner = WriterRunner { actor, shutdown_token: shutdown_token.clone() };
        let handle = Self { tx, reports, shutdown_token };
        (handle, runner)
    }

    /// Create a handle and spawn its actor on the current runtime.
    pub fn spawn(store: Arc<JournalStore>, config: WriterConfig) -> Self {
        let (handle, runner) = Self::new(store, config);
        tokio::spawn(runner.run());
        handle
    }

    /// Queue one event for the current window, opening a window if none is.
    pub async fn record(&self, event: HandshakeEvent) -> Result<(), WriterError> {
        self.tx
            .send(WriterCmd::Record(event))
            .await
            .map_err(|_| WriterError::Closed)
    }

    /// Receive a `FlushReport` for every window flushed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FlushReport> {
        self.reports.subscribe()
    }

    /// Flush whatever is queued and stop the actor. Returns once the final
    /// window has been written.
    pub async fn close(&self) -> Result<(), WriterError> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .send(WriterCmd::Close { resp })
            .await
            .map_err(|_| WriterError::Closed)?;
        rx.await.map_err(|_| WriterError::Closed)
    }

    /// Request actor shutdown (non-blocking). Queued events are still flushed.
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct WriterActor {
    store: Arc<JournalStore>,
    rx: mpsc::Receiver<WriterCmd>,
    window: Duration,
    batch: Vec<HandshakeEvent>,
    /// Set while a window is open
    deadline: Option<Instant>,
    reports: broadcast::Sender<FlushReport>,
}

impl WriterActor {
    async fn run(mut self, shutdown_token: CancellationToken) {
        debug!("Journal writer started (window {:?})", self.window);
        let waiters = loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;

                _ = shutdown_token.cancelled() => {
                    let waiters = self.drain();
                    self.flush().await;
                    break waiters;
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush().await;
                }

                msg = self.rx.recv() => {
                    match msg {
                        Some(WriterCmd::Record(event)) => self.push(event),
                        Some(WriterCmd::Close { resp }) => {
                            let mut waiters = self.drain();
                            waiters.push(resp);
                            self.flush().await;
                            break waiters;
                        }
                        None => {
                            self.flush().await;
                            break Vec::new();
                        }
                    }
                }
            }
        };

        // Release the store before anyone waiting on close() may reopen it
        drop(self);
        info!("Journal writer stopped");
        for resp in waiters {
            let _ = resp.send(());
        }
    }

    fn push(&mut self, event: HandshakeEvent) {
        trace!("Queued handshake from {} at {}", event.peer.short(), event.observed_at);
        self.batch.push(event);
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.window);
        }
    }

    /// Take every command already queued. Records join the batch; close
    /// requests are returned so they can be answered after the flush.
    fn drain(&mut self) -> Vec<oneshot::Sender<()>> {
        self.rx.close();
        let mut waiters = Vec::new();
        while let Ok(cmd) = self.rx.try_recv() {
            match cmd {
                WriterCmd::Record(event) => self.push(event),
                WriterCmd::Close { resp } => waiters.push(resp),
            }
        }
        waiters
    }

    async fn flush(&mut self) {
        self.deadline = None;
        if self.batch.is_empty() {
            return;
        }

        let mut batch = std::mem::take(&mut self.batch);
        batch.sort_by_key(|e| (e.observed_at, e.peer));
        let store = self.store.clone();

        match tokio::task::spawn_blocking(move || append_batch(&store, &batch)).await {
            Ok(report) => {
                debug!(
                    "Flushed window: {} committed, {} skipped",
                    report.committed, report.skipped
                );
                let _ = self.reports.send(report);
            }
            Err(e) => error!("Journal flush task failed: {}", e),
        }
    }
}

/// Append a sorted batch one record at a time. A failing record is logged
/// and skipped; the rest of the batch is still written.
fn append_batch(store: &JournalStore, batch: &[HandshakeEvent]) -> FlushReport {
    let mut report = FlushReport::default();
    for event in batch {
        let key = JournalKey::from(event);
        match store.append(key, JournalRecord::from(event)) {
            Ok(()) => report.committed += 1,
            Err(e @ StorageError::OutOfOrderWrite { .. }) => {
                warn!("Skipping handshake: {}", e);
                report.skipped += 1;
            }
            Err(e) => {
                error!("Failed to append {}: {}", key, e);
                report.skipped += 1;
            }
        }
    }
    report
}
