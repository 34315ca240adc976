//! `upd config` handlers

use crate::commands::ConfigSubcommand;
use anyhow::Context;
use upd_node::{add_peer, load_config, remove_peer, write_config, AddOutcome, AppConfig, DataDir, PeerConfig};

pub fn handle(data_dir: &DataDir, cmd: ConfigSubcommand) -> anyhow::Result<()> {
    let path = data_dir.peer_config();
    match cmd {
        ConfigSubcommand::Add { public_key, ip_address, port, keep_alive, overwrite } => {
            data_dir.ensure_dirs().context("Failed to create data directory")?;
            let peer = PeerConfig::parse(&public_key, ip_address, port, keep_alive)?;
            let key = peer.public_key;
            match add_peer(&path, peer, overwrite)? {
                AddOutcome::Added => println!("Added peer {}", key),
                AddOutcome::Overwritten => println!("Overwrote peer {}", key),
                AddOutcome::AlreadyPresent => {
                    println!("Peer {} already exists (use --overwrite to replace it)", key)
                }
            }
        }
        ConfigSubcommand::Remove { public_key } => {
            if remove_peer(&path, &public_key)? {
                println!("Removed peer {}", public_key);
            } else {
                println!("Peer {} is not configured", public_key);
            }
        }
        ConfigSubcommand::List => {
            let config = load_config(&path)?;
            if config.peers.is_empty() {
                println!("No peers configured");
            }
            for peer in &config.peers {
                println!(
                    "{}  {}:{}  keep-alive {}s",
                    peer.public_key, peer.ip_address, peer.port, peer.keep_alive
                );
            }
        }
        ConfigSubcommand::Clear => {
            data_dir.ensure_dirs().context("Failed to create data directory")?;
            write_config(&AppConfig::default(), &path)?;
            println!("Cleared {}", path.display());
        }
        ConfigSubcommand::Delete => {
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to delete {}", path.display()))?;
                println!("Deleted {}", path.display());
            } else {
                println!("No config at {}", path.display());
            }
        }
    }
    Ok(())
}
