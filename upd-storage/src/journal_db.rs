use crate::record::{JournalKey, JournalRecord};
use redb::{Database, ReadOnlyTable, ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::VecDeque;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, trace};

// Table Definitions
pub const TABLE_JOURNAL: TableDefinition<&[u8], &[u8]> = TableDefinition::new("journal");

/// File name of the journal inside the base directory.
pub const JOURNAL_FILE: &str = "system-uptime.redb";

/// Cache provisioned on top of the current file size.
pub const DEFAULT_CACHE_HEADROOM: usize = 64 * 1024 * 1024;

/// Entries fetched per read of a `JournalScan`.
const SCAN_PAGE: usize = 256;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Journal unavailable at {}: {source}", path.display())]
    EnvironmentUnavailable {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Out-of-order write: {attempted} does not follow {last}")]
    OutOfOrderWrite { last: JournalKey, attempted: JournalKey },
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("Storage error: {0}")]
    Engine(#[from] redb::StorageError),
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt journal entry: {0}")]
    Corrupt(String),
}

/// Options for opening a `JournalStore`.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Bytes of engine cache on top of the existing file size.
    pub cache_headroom: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { cache_headroom: DEFAULT_CACHE_HEADROOM }
    }
}

/// Append-ordered handshake journal.
///
/// Keys must arrive strictly increasing: every `append` checks the new key
/// against the current maximum inside the write transaction, so the table
/// behaves as an append-only log even though the engine is a general sorted
/// map. Readers get snapshot isolation from the engine and never block the
/// writer.
pub struct JournalStore {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for JournalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JournalStore {
    /// Open or create the journal under `base`.
    pub fn open(base: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with(base, StoreOptions::default())
    }

    pub fn open_with(base: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StorageError> {
        let base = base.as_ref();
        let path = base.join(JOURNAL_FILE);
        let unavailable = |source: Box<dyn std::error::Error + Send + Sync>| {
            StorageError::EnvironmentUnavailable { path: path.clone(), source }
        };

        std::fs::create_dir_all(base).map_err(|e| unavailable(e.into()))?;

        let existing = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let cache_size = usize::try_from(existing)
            .unwrap_or(usize::MAX)
            .saturating_add(options.cache_headroom);
        debug!("Opening journal at {} (cache {}b)", path.display(), cache_size);

        let db = Database::builder()
            .set_cache_size(cache_size)
            .create(&path)
            .map_err(|e| unavailable(e.into()))?;

        trace!("Created environment, creating journal table");
        let write_txn = db.begin_write().map_err(|e| unavailable(e.into()))?;
        write_txn
            .open_table(TABLE_JOURNAL)
            .map_err(|e| unavailable(e.into()))?;
        write_txn.commit().map_err(|e| unavailable(e.into()))?;

        Ok(Self { db, path })
    }

    /// Remove the journal file under `base`. The store must not be open.
    pub fn delete(base: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = base.as_ref().join(JOURNAL_FILE);
        debug!("Deleting journal at {}", path.display());
        std::fs::remove_file(&path)?;
        info!("Deleted journal at {}", path.display());
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Fails with `OutOfOrderWrite` unless `key` is greater
    /// than every key already in the journal; the transaction is then aborted
    /// and nothing is written.
    pub fn append(&self, key: JournalKey, record: JournalRecord) -> Result<(), StorageError> {
        trace!("Opening transaction to append {}", key);
        let write_txn = self.db.begin_write()?;
        let verdict = {
            let mut table = write_txn.open_table(TABLE_JOURNAL)?;
            match last_key_in(&table)? {
                Some(last) if key <= last => Err(StorageError::OutOfOrderWrite { last, attempted: key }),
                _ => {
                    table.insert(key.encode().as_slice(), record.encode().as_slice())?;
                    Ok(())
                }
            }
        };

        match verdict {
            Ok(()) => {
                write_txn.commit()?;
                trace!("Appended {} (rtt {:?})", key, record.rtt);
                Ok(())
            }
            Err(e) => {
                write_txn.abort()?;
                Err(e)
            }
        }
    }

    /// Lazily iterate every entry in ascending key order.
    ///
    /// The scan reads from one snapshot taken now; appends made while it is
    /// being consumed are not visible to it.
    pub fn scan_all(&self) -> Result<JournalScan, StorageError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TABLE_JOURNAL)?;
        Ok(JournalScan {
            _txn: txn,
            table,
            cursor: None,
            page: VecDeque::new(),
            exhausted: false,
        })
    }

    /// Largest key in the journal.
    pub fn last_key(&self) -> Result<Option<JournalKey>, StorageError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TABLE_JOURNAL)?;
        last_key_in(&table)
    }

    /// Number of entries.
    pub fn len(&self) -> Result<u64, StorageError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TABLE_JOURNAL)?;
        Ok(table.len()?)
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Delete every entry in a single transaction.
    pub fn clear(&self) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write()?;
        write_txn.delete_table(TABLE_JOURNAL)?;
        write_txn.open_table(TABLE_JOURNAL)?;
        write_txn.commit()?;
        info!("Cleared journal at {}", self.path.display());
        Ok(())
    }
}

fn last_key_in<T>(table: &T) -> Result<Option<JournalKey>, StorageError>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    match table.last()? {
        Some((key, _)) => Ok(Some(JournalKey::decode(key.value())?)),
        None => Ok(None),
    }
}

/// Snapshot iterator returned by `JournalStore::scan_all`.
///
/// Entries are pulled from the snapshot in pages, resuming after the last key
/// handed out, so memory stays bounded however long the journal is.
pub struct JournalScan {
    _txn: ReadTransaction,
    table: ReadOnlyTable<&'static [u8], &'static [u8]>,
    cursor: Option<JournalKey>,
    page: VecDeque<(JournalKey, JournalRecord)>,
    exhausted: bool,
}

impl JournalScan {
    fn fill_page(&mut self) -> Result<(), StorageError> {
        let after = self.cursor.map(|k| k.encode());
        let lower = match &after {
            Some(bytes) => Bound::Excluded(bytes.as_slice()),
            None => Bound::Unbounded,
        };
        let range = self.table.range::<&[u8]>((lower, Bound::Unbounded))?;
        for entry in range.take(SCAN_PAGE) {
            let (k, v) = entry?;
            let key = JournalKey::decode(k.value())?;
            let record = JournalRecord::decode(v.value())?;
            self.page.push_back((key, record));
        }
        if self.page.len() < SCAN_PAGE {
            self.exhausted = true;
        }
        if let Some((last, _)) = self.page.back() {
            self.cursor = Some(*last);
        }
        Ok(())
    }
}

impl Iterator for JournalScan {
    type Item = Result<(JournalKey, JournalRecord), StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() && !self.exhausted {
            if let Err(e) = self.fill_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.page.pop_front().map(Ok)
    }
}
