use crate::error::AppError;
use crate::store::{RawRecord, StoreClient};
use std::collections::VecDeque;

/// Range keys are never lexically below this sentinel by convention, so a
/// query from here means "every child of the partition".
pub const RANGE_KEY_FLOOR: &str = "0";

/// Page size used by association load, reconciliation and cascade passes
/// unless the relation overrides it.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Lazy, forward-only pass over one partition's records, fetched in fixed-size
/// pages so memory use stays bounded by one page regardless of child count.
///
/// Every `ChildScan` starts a fresh server-side query from its lower bound;
/// nothing is cached and a partially consumed scan is never resumed by a new
/// one. A store failure is yielded once and fuses the iterator.
pub struct ChildScan<'a, S: StoreClient> {
    store: &'a S,
    collection: &'static str,
    partition_key: String,
    range_lower: String,
    batch_size: usize,
    buffer: VecDeque<RawRecord>,
    cursor: Option<String>,
    more: bool,
    done: bool,
}

impl<'a, S: StoreClient> ChildScan<'a, S> {
    pub fn new(
        store: &'a S,
        collection: &'static str,
        partition_key: &str,
        range_lower: &str,
        batch_size: usize,
    ) -> Self {
        assert!(batch_size >= 1);
        ChildScan {
            store,
            collection,
            partition_key: partition_key.to_string(),
            range_lower: range_lower.to_string(),
            batch_size,
            buffer: VecDeque::new(),
            cursor: None,
            more: true,
            done: false,
        }
    }

    fn fetch_page(&mut self) -> Result<(), AppError> {
        let page = self.store.query_page(
            self.collection,
            &self.partition_key,
            &self.range_lower,
            self.cursor.as_deref(),
            self.batch_size,
        )?;
        // An empty page ends the scan even if the client claims a continuation
        self.more = page.last_key.is_some() && !page.records.is_empty();
        self.cursor = page.last_key;
        self.buffer.extend(page.records);
        Ok(())
    }
}

impl<S: StoreClient> Iterator for ChildScan<'_, S> {
    type Item = Result<RawRecord, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if !self.more {
                self.done = true;
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
