use crate::error::AppError;
use crate::info;
use redb::{Database, TableDefinition, TableError};
use std::env;
use std::fs;
use std::ops::Bound;
use std::path::PathBuf;

/// One persisted child row, exactly as the store returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub partition_key: String,
    pub range_key: String,
    pub payload: Vec<u8>,
}

/// One batch of a paged range query. `last_key = Some(k)` means more pages may
/// follow and the next one must start strictly after `k`; `None` means the
/// query is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<RawRecord>,
    pub last_key: Option<String>,
}

impl Page {
    pub fn empty() -> Self {
        Page { records: Vec::new(), last_key: None }
    }
}

/// The boundary to the underlying hash/range sorted key-value store. Retry,
/// timeout and transaction policy all live behind this trait, not above it.
pub trait StoreClient {
    /// Reads at most `limit` records of `collection` under `partition_key`, in
    /// ascending range-key order, with `range_key >= range_lower` and, when
    /// `start_after` is given, `range_key > start_after`.
    fn query_page(
        &self,
        collection: &str,
        partition_key: &str,
        range_lower: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Page, AppError>;

    /// Idempotent upsert by `(partition_key, range_key)` composite key.
    fn put(&self, collection: &str, record: &RawRecord) -> Result<(), AppError>;

    /// Idempotent delete by composite key; deleting an absent key is not an error.
    fn delete(&self, collection: &str, partition_key: &str, range_key: &str) -> Result<(), AppError>;
}

const RECORDS: TableDefinition<'static, (String, String, String), Vec<u8>> =
    TableDefinition::new("redkin_records");

/// Store client backed by a single embedded redb database. Rows of every
/// collection share one table keyed by `(collection, partition_key, range_key)`,
/// which redb orders lexicographically element-wise, so a partition's children
/// come back in range-key order for free. Every page opens a fresh read
/// transaction; nothing is cached between calls.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    pub fn open(db_path: PathBuf, cache_size_mb: usize) -> Result<Self, AppError> {
        if let Some(dir) = db_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let db = if db_path.exists() {
            info!("Opening existing store at {:?}, it might take a while in case previous process was killed", db_path);
            Database::builder().set_cache_size(cache_size_mb * 1024 * 1024).open(db_path)?
        } else {
            Database::builder().set_cache_size(cache_size_mb * 1024 * 1024).create(db_path)?
        };
        Ok(RedbStore { db })
    }

    /// Creates a throwaway store under the OS temp dir with a random suffix.
    pub fn temp(name: &str) -> Result<Self, AppError> {
        let db_path = env::temp_dir().join("redkin").join(format!("{}_{}.redb", name, rand::random::<u64>()));
        Self::open(db_path, 64)
    }
}

impl StoreClient for RedbStore {
    fn query_page(
        &self,
        collection: &str,
        partition_key: &str,
        range_lower: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Page, AppError> {
        let tx = self.db.begin_read()?;
        let table = match tx.open_table(RECORDS) {
            Ok(table) => table,
            // Nothing was ever written: an empty result set, not an error
            Err(TableError::TableDoesNotExist(_)) => return Ok(Page::empty()),
            Err(e) => return Err(e.into()),
        };
        // A cursor below the lower bound must not widen the query
        let start = match start_after {
            Some(after) if after >= range_lower => {
                Bound::Excluded((collection.to_string(), partition_key.to_string(), after.to_string()))
            }
            _ => Bound::Included((collection.to_string(), partition_key.to_string(), range_lower.to_string())),
        };
        let mut records = Vec::new();
        for entry in table.range((start, Bound::Unbounded))? {
            let (key_guard, value_guard) = entry?;
            let (coll, pk, range_key) = key_guard.value();
            if coll != collection || pk != partition_key {
                break;
            }
            records.push(RawRecord { partition_key: pk, range_key, payload: value_guard.value() });
            if records.len() == limit {
                break;
            }
        }
        let last_key = if records.len() == limit && limit > 0 {
            records.last().map(|r| r.range_key.clone())
        } else {
            None
        };
        Ok(Page { records, last_key })
    }

    fn put(&self, collection: &str, record: &RawRecord) -> Result<(), AppError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(RECORDS)?;
            table.insert(
                &(collection.to_string(), record.partition_key.clone(), record.range_key.clone()),
                &record.payload,
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, collection: &str, partition_key: &str, range_key: &str) -> Result<(), AppError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(RECORDS)?;
            table.remove(&(collection.to_string(), partition_key.to_string(), range_key.to_string()))?;
        }
        tx.commit()?;
        Ok(())
    }
}
