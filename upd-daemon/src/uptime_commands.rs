//! `upd uptime` handlers

use crate::commands::UptimeSubcommand;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::io::Write;
use upd_model::{PeerId, Timestamp};
use upd_node::DataDir;
use upd_storage::{JournalKey, JournalRecord, JournalStore};

pub fn handle(data_dir: &DataDir, cmd: UptimeSubcommand) -> anyhow::Result<()> {
    match cmd {
        UptimeSubcommand::List { peer } => {
            let store = JournalStore::open(data_dir.journal_dir()).context("Failed to open journal")?;
            let mut out = std::io::stdout().lock();
            let shown = list(&store, peer, &mut out)?;
            writeln!(out, "{} records", shown)?;
        }
        UptimeSubcommand::Clear => {
            let store = JournalStore::open(data_dir.journal_dir()).context("Failed to open journal")?;
            store.clear()?;
            println!("Cleared {}", store.path().display());
        }
        UptimeSubcommand::Delete => {
            let path = data_dir.journal_file();
            if !path.exists() {
                println!("No journal at {}", path.display());
                return Ok(());
            }
            JournalStore::delete(data_dir.journal_dir())?;
            println!("Deleted {}", path.display());
        }
    }
    Ok(())
}

/// Write one line per record, optionally only for `peer`. Returns the number
/// of lines written.
fn list(store: &JournalStore, peer: Option<PeerId>, out: &mut impl Write) -> anyhow::Result<usize> {
    let mut shown = 0;
    for entry in store.scan_all()? {
        let (key, record) = entry?;
        if peer.is_some_and(|p| p != key.peer) {
            continue;
        }
        writeln!(out, "{}", format_entry(&key, &record))?;
        shown += 1;
    }
    Ok(shown)
}

fn format_time(ts: Timestamp) -> String {
    let nanos = ts.as_nanos();
    let secs = i64::try_from(nanos / 1_000_000_000).unwrap_or(i64::MAX);
    // Sub-second part is always below 1e9
    let sub = (nanos % 1_000_000_000) as u32;
    match DateTime::<Utc>::from_timestamp(secs, sub) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
        None => ts.to_string(),
    }
}

fn format_entry(key: &JournalKey, record: &JournalRecord) -> String {
    format!(
        "{}  {}  {:.3} ms",
        format_time(key.timestamp),
        key.peer,
        record.rtt.as_secs_f64() * 1000.0
    )
}
