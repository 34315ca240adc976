//! Handshake sources
//!
//! The transport reports completed handshakes per peer through a
//! `HandshakeSource`. `HandshakeFeed` adapts a line-oriented JSON stream
//! (stdin for the daemon) into one source per configured peer.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use upd_model::{Clock, HandshakeEvent, PeerId, Timestamp};

/// Async stream of handshakes for one peer. `None` means the peer's stream
/// has ended.
#[async_trait]
pub trait HandshakeSource: Send {
    async fn next_event(&mut self) -> Option<HandshakeEvent>;
}

#[async_trait]
impl HandshakeSource for mpsc::Receiver<HandshakeEvent> {
    async fn next_event(&mut self) -> Option<HandshakeEvent> {
        self.recv().await
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Malformed handshake line: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Handshake from unconfigured peer {0}")]
    UnknownPeer(PeerId),
}

/// One line of the feed:
/// `{"peer":"<base64>","rtt_us":1234}` with an optional `"observed_at"` in
/// nanoseconds on the journal clock.
#[derive(Debug, Deserialize)]
struct Signal {
    peer: PeerId,
    rtt_us: u64,
    #[serde(default)]
    observed_at: Option<u64>,
}

/// Demultiplexes a JSON-lines handshake stream into per-peer channels.
pub struct HandshakeFeed {
    clock: Arc<dyn Clock>,
    routes: HashMap<PeerId, mpsc::Sender<HandshakeEvent>>,
    capacity: usize,
}

impl HandshakeFeed {
    pub fn new(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            clock,
            routes: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Route handshakes for `peer` to the returned source.
    pub fn register(&mut self, peer: PeerId) -> mpsc::Receiver<HandshakeEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.routes.insert(peer, tx);
        rx
    }

    /// Parse one line into an event for a registered peer. Lines without a
    /// timestamp are stamped with the current clock time.
    pub fn parse_line(&self, line: &str) -> Result<HandshakeEvent, FeedError> {
        let signal: Signal = serde_json::from_str(line)?;
        if !self.routes.contains_key(&signal.peer) {
            return Err(FeedError::UnknownPeer(signal.peer));
        }
        let observed_at = signal
            .observed_at
            .map(Timestamp::from_nanos)
            .unwrap_or_else(|| self.clock.now());
        Ok(HandshakeEvent::new(
            observed_at,
            signal.peer,
            Duration::from_micros(signal.rtt_us),
        ))
    }

    /// Read `reader` until EOF or cancellation, forwarding each valid line to
    /// its peer's source. Bad lines are logged and skipped. Returns the number
    /// of events delivered. Every source sees end-of-stream when this returns.
    pub async fn run<R>(self, reader: R, cancel: CancellationToken) -> std::io::Result<u64>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut delivered = 0u64;
        info!("Handshake feed started for {} peers", self.routes.len());
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                debug!("Handshake feed reached end of input");
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let event = match self.parse_line(line) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Skipping feed line: {}", e);
                    continue;
                }
            };
            let Some(tx) = self.routes.get(&event.peer) else {
                continue;
            };
            trace!("Feed handshake {} at {}", event.peer.short(), event.observed_at);
            if tx.send(event).await.is_err() {
                debug!("Source for {} is gone", event.peer.short());
                continue;
            }
            delivered += 1;
        }
        Ok(delivered)
    }
}
