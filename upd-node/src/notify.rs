//! Liveness notifiers
//!
//! A `Notifier` is told about every liveness edge of a configured peer.
//! Failures are returned to the caller, which logs them and carries on.

use crate::config::PeerConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use upd_liveness::Transition;
use upd_model::PeerId;

/// Workflow id sent when none is configured.
pub const DEFAULT_WORKFLOW_ID: &str = "Wf09QL1QBDS7";

/// Upper bound on one webhook request, connect included.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Webhook returned {0}")]
    Status(reqwest::StatusCode),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Script failed: {0}")]
    Script(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, peer: &PeerConfig, transition: Transition) -> Result<(), NotifyError>;
}

fn key_text(key: Option<PeerId>) -> String {
    key.map(|k| k.to_base64()).unwrap_or_default()
}

/// Writes each transition to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    local_key: Option<PeerId>,
}

impl LogNotifier {
    pub fn new(local_key: Option<PeerId>) -> Self {
        Self { local_key }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, peer: &PeerConfig, transition: Transition) -> Result<(), NotifyError> {
        info!(
            peer = %peer.public_key,
            notifier = %key_text(self.local_key),
            ip = %peer.ip_address,
            port = peer.port,
            "Peer is {}",
            transition
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    peer_public_key: String,
    notifier_public_key: String,
    ip_address: &'a str,
    port: String,
    status: Transition,
    workflow_id: &'a str,
}

/// POSTs a JSON body per transition to a workflow webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    workflow_id: String,
    local_key: Option<PeerId>,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        workflow_id: impl Into<String>,
        local_key: Option<PeerId>,
    ) -> Result<Self, NotifyError> {
        Self::with_timeout(url, workflow_id, local_key, WEBHOOK_TIMEOUT)
    }

    pub fn with_timeout(
        url: impl Into<String>,
        workflow_id: impl Into<String>,
        local_key: Option<PeerId>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            workflow_id: workflow_id.into(),
            local_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, peer: &PeerConfig, transition: Transition) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            peer_public_key: peer.public_key.to_base64(),
            notifier_public_key: key_text(self.local_key),
            ip_address: &peer.ip_address,
            port: peer.port.to_string(),
            status: transition,
            workflow_id: &self.workflow_id,
        };
        let resp = self.client.post(&self.url).json(&payload).send().await?;
        if !resp.status().is_success() {
            return Err(NotifyError::Status(resp.status()));
        }
        debug!("Webhook accepted {} for {}", transition, peer.public_key.short());
        Ok(())
    }
}

/// Runs an executable per transition with the peer described in its
/// environment.
#[derive(Debug, Clone)]
pub struct ScriptNotifier {
    path: PathBuf,
    local_key: Option<PeerId>,
}

impl ScriptNotifier {
    pub fn new(path: impl Into<PathBuf>, local_key: Option<PeerId>) -> Self {
        Self { path: path.into(), local_key }
    }
}

#[async_trait]
impl Notifier for ScriptNotifier {
    async fn notify(&self, peer: &PeerConfig, transition: Transition) -> Result<(), NotifyError> {
        let status = tokio::process::Command::new(&self.path)
            .env("PEER_PUBLIC_KEY", peer.public_key.to_base64())
            .env("NOTIFIER_PUBLIC_KEY", key_text(self.local_key))
            .env("IP_ADDRESS", &peer.ip_address)
            .env("PORT", peer.port.to_string())
            .env("PEER_STATUS", transition.as_str())
            .kill_on_drop(true)
            .status()
            .await?;
        if !status.success() {
            return Err(NotifyError::Script(format!("{} exited with {}", self.path.display(), status)));
        }
        Ok(())
    }
}
