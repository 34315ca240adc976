//! Command line definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use upd_model::PeerId;
use upd_node::DEFAULT_WORKFLOW_ID;

#[derive(Parser, Debug)]
#[command(name = "upd", version, about = "Peer uptime journal")]
pub struct Args {
    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory (defaults to ~/.upd)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the uptime daemon, reading handshakes as JSON lines from stdin
    Run {
        /// This node's public key, included in notifications
        #[arg(long)]
        local_key: Option<PeerId>,
        /// Seconds between inactivity sweeps
        #[arg(long, default_value_t = 20)]
        sweep_secs: u64,
        /// Seconds of silence before a peer counts as inactive
        #[arg(long, default_value_t = 240)]
        threshold_secs: u64,
        /// Milliseconds handshakes are coalesced before being written
        #[arg(long, default_value_t = 1000)]
        window_ms: u64,
        #[command(subcommand)]
        notifier: Option<NotifierCommand>,
    },
    /// Inspect or reset the handshake journal
    Uptime {
        #[command(subcommand)]
        subcommand: UptimeSubcommand,
    },
    /// Manage the configured peers
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum NotifierCommand {
    /// Log liveness changes (default)
    Print,
    /// POST liveness changes to a workflow webhook
    Webhook {
        /// Webhook URL; falls back to UPD_WEBHOOK_URL
        #[arg(long)]
        url: Option<String>,
        #[arg(long, default_value = DEFAULT_WORKFLOW_ID)]
        workflow_id: String,
    },
    /// Run a script for each liveness change
    Script {
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum UptimeSubcommand {
    /// Print every journal record
    List {
        /// Only show records for this peer
        #[arg(long)]
        peer: Option<PeerId>,
    },
    /// Remove all records, keeping the file
    Clear,
    /// Delete the journal file
    Delete,
}

#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Add a peer
    Add {
        /// Base64 public key
        public_key: String,
        ip_address: String,
        port: u16,
        /// Keep-alive interval in seconds
        keep_alive: u64,
        /// Replace the peer if it already exists
        #[arg(long)]
        overwrite: bool,
    },
    /// Remove a peer
    Remove {
        public_key: PeerId,
    },
    /// Print the configured peers
    List,
    /// Remove all peers
    Clear,
    /// Delete the config file
    Delete,
}
