//! `upd run`

use crate::commands::NotifierCommand;
use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use upd_model::{Clock, PeerId, SystemClock};
use upd_node::{
    load_config, DataDir, HandshakeFeed, JournalStore, LogNotifier, Monitor, MonitorConfig,
    Notifier, ScriptNotifier, TrackerConfig, WebhookNotifier, WriterConfig,
};

const WEBHOOK_URL_VAR: &str = "UPD_WEBHOOK_URL";
const FEED_CAPACITY: usize = 256;

pub struct RunOptions {
    pub local_key: Option<PeerId>,
    pub sweep_secs: u64,
    pub threshold_secs: u64,
    pub window_ms: u64,
    pub notifier: Option<NotifierCommand>,
}

impl RunOptions {
    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            sweep_interval: Duration::from_secs(self.sweep_secs.max(1)),
            writer: WriterConfig {
                window: Duration::from_millis(self.window_ms),
                ..Default::default()
            },
            tracker: TrackerConfig {
                inactivity_threshold: Duration::from_secs(self.threshold_secs),
            },
        }
    }
}

fn build_notifier(
    command: Option<NotifierCommand>,
    local_key: Option<PeerId>,
) -> anyhow::Result<Arc<dyn Notifier>> {
    Ok(match command.unwrap_or(NotifierCommand::Print) {
        NotifierCommand::Print => Arc::new(LogNotifier::new(local_key)),
        NotifierCommand::Webhook { url, workflow_id } => {
            let url = match url {
                Some(url) => url,
                None => std::env::var(WEBHOOK_URL_VAR)
                    .map_err(|_| anyhow!("No webhook URL: pass --url or set {}", WEBHOOK_URL_VAR))?,
            };
            Arc::new(WebhookNotifier::new(url, workflow_id, local_key)?)
        }
        NotifierCommand::Script { path } => {
            if !path.is_file() {
                return Err(anyhow!("Script not found: {}", path.display()));
            }
            Arc::new(ScriptNotifier::new(path, local_key))
        }
    })
}

pub async fn run(data_dir: &DataDir, opts: RunOptions) -> anyhow::Result<()> {
    tracing::info!("upd v{} starting...", env!("CARGO_PKG_VERSION"));
    data_dir.ensure_dirs().context("Failed to create data directory")?;

    let config = load_config(&data_dir.peer_config()).context("Failed to load peer config")?;
    if config.peers.is_empty() {
        tracing::warn!("No peers configured; add some with `upd config add`");
    }

    let store = JournalStore::open(data_dir.journal_dir()).context("Failed to open journal")?;
    let store = Arc::new(store);
    let notifier = build_notifier(opts.notifier.clone(), opts.local_key)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut feed = HandshakeFeed::new(clock.clone(), FEED_CAPACITY);
    let sources: HashMap<_, _> = config
        .peer_ids()
        .into_iter()
        .map(|peer| (peer, feed.register(peer)))
        .collect();

    let monitor = Monitor::new(store, config.peers, notifier, clock, opts.monitor_config());
    let cancel = monitor.shutdown_token();

    let feed_task = tokio::spawn(feed.run(BufReader::new(tokio::io::stdin()), cancel.clone()));
    let mut monitor_task = tokio::spawn(monitor.run(sources));
    tracing::info!("Daemon ready. Press Ctrl+C to stop.");

    let finished_early = tokio::select! {
        signal = crate::shutdown_signal() => {
            match signal {
                Ok(()) => tracing::info!("Shutdown signal received..."),
                Err(e) => tracing::error!("Failed to listen for shutdown signals: {}", e),
            }
            None
        }
        result = &mut monitor_task => Some(result),
    };

    cancel.cancel();
    let result = match finished_early {
        Some(result) => result,
        None => monitor_task.await,
    };

    match feed_task.await {
        Ok(Ok(count)) => tracing::debug!("Feed delivered {} handshakes", count),
        Ok(Err(e)) => tracing::warn!("Handshake feed failed: {}", e),
        Err(e) => tracing::warn!("Handshake feed task failed: {}", e),
    }

    result.context("Monitor task panicked")??;
    tracing::info!("Daemon stopped");
    Ok(())
}
