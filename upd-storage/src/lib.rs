//! Append-ordered handshake journal on redb
//!
//! One sorted table maps `JournalKey` (timestamp, peer) to `JournalRecord`
//! (round-trip time). Writes must be strictly increasing in key order.
pub mod journal_db;
pub mod record;

// Re-export common items
pub use journal_db::{
    JournalScan, JournalStore, StorageError, StoreOptions, DEFAULT_CACHE_HEADROOM, JOURNAL_FILE,
    TABLE_JOURNAL,
};
pub use record::{JournalKey, JournalRecord, KEY_LEN, RECORD_LEN};
