use crate::error::AppError;
use crate::store::{RawRecord, StoreClient};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

static MINT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Mints a fresh range key: zero-padded epoch microseconds, an in-process
/// sequence number, and a random suffix. Keys sort lexicographically in mint
/// order (the sequence breaks same-microsecond ties) and always sit above
/// [`crate::RANGE_KEY_FLOOR`].
pub fn mint_range_key() -> String {
    let micros = chrono::Utc::now().timestamp_micros().max(0) as u64;
    let seq = MINT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{micros:020}:{seq:016}-{:08x}", rand::random::<u32>())
}

/// Persistence contract for the child side of a has-many relation.
///
/// A child lives under a partition key equal to its parent's id and is ordered
/// among its siblings by a range key it commits to at first save. Implementors
/// provide the key accessors and setters over their own fields; the save,
/// destroy and hydrate paths are provided.
pub trait ChildEntity: Serialize + DeserializeOwned {
    /// The store collection this child type's records live in.
    const COLLECTION: &'static str;

    /// The owning parent's id, `None` until bound.
    fn partition_key(&self) -> Option<&str>;

    /// The sibling ordering key, `None` until first saved.
    fn range_key(&self) -> Option<&str>;

    fn bind(&mut self, partition_key: &str);

    fn commit_range_key(&mut self, range_key: String);

    /// Upserts this child under its `(partition_key, range_key)` composite key,
    /// minting and committing a range key on first save.
    fn save<S: StoreClient>(&mut self, store: &S) -> Result<(), AppError> {
        let partition_key = match self.partition_key() {
            Some(pk) => pk.to_string(),
            None => {
                return Err(AppError::UnboundChild(format!(
                    "cannot save a {} record with no partition key",
                    Self::COLLECTION
                )))
            }
        };
        let range_key = match self.range_key() {
            Some(rk) => rk.to_string(),
            None => {
                let rk = mint_range_key();
                self.commit_range_key(rk.clone());
                rk
            }
        };
        let payload = bincode::serialize(self)?;
        store.put(Self::COLLECTION, &RawRecord { partition_key, range_key, payload })
    }

    /// Deletes this child's row. A child that never committed to a composite
    /// key has nothing in the store, so destroying it is a no-op.
    fn destroy<S: StoreClient>(&self, store: &S) -> Result<(), AppError> {
        match (self.partition_key(), self.range_key()) {
            (Some(pk), Some(rk)) => store.delete(Self::COLLECTION, pk, rk),
            _ => Ok(()),
        }
    }

    fn hydrate(record: &RawRecord) -> Result<Self, AppError> {
        Ok(bincode::deserialize(&record.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RedbStore;
    use crate::RANGE_KEY_FLOOR;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Reading {
        sensor_id: Option<String>,
        seq: Option<String>,
        value: f64,
    }

    impl Reading {
        fn new(value: f64) -> Self {
            Reading { sensor_id: None, seq: None, value }
        }
    }

    impl ChildEntity for Reading {
        const COLLECTION: &'static str = "readings";

        fn partition_key(&self) -> Option<&str> {
            self.sensor_id.as_deref()
        }

        fn range_key(&self) -> Option<&str> {
            self.seq.as_deref()
        }

        fn bind(&mut self, partition_key: &str) {
            self.sensor_id = Some(partition_key.to_string());
        }

        fn commit_range_key(&mut self, range_key: String) {
            self.seq = Some(range_key);
        }
    }

    #[test]
    fn it_should_mint_keys_above_the_floor_and_in_order() {
        let keys: Vec<String> = (0..100).map(|_| mint_range_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted, "mint order must match lexicographic order");
        assert!(keys.iter().all(|k| k.as_str() >= RANGE_KEY_FLOOR));
    }

    #[test]
    fn it_should_commit_a_range_key_on_first_save_and_keep_it() {
        let store = RedbStore::temp("entity_save").expect("Failed to create temp store");
        let mut reading = Reading::new(1.5);
        reading.bind("sensor-1");
        reading.save(&store).expect("Failed to save");
        let committed = reading.seq.clone().expect("range key must be committed");

        reading.value = 2.5;
        reading.save(&store).expect("Failed to re-save");
        assert_eq!(reading.seq.as_deref(), Some(committed.as_str()), "re-save must not re-key");

        let page = store.query_page("readings", "sensor-1", RANGE_KEY_FLOOR, None, 10).expect("Failed to query");
        assert_eq!(page.records.len(), 1, "save is an upsert");
        let hydrated = Reading::hydrate(&page.records[0]).expect("Failed to hydrate");
        assert_eq!(hydrated, reading);
    }

    #[test]
    fn it_should_refuse_to_save_an_unbound_child() {
        let store = RedbStore::temp("entity_unbound").expect("Failed to create temp store");
        let mut reading = Reading::new(1.0);
        let err = reading.save(&store).expect_err("saving without a partition key must fail");
        assert!(matches!(err, AppError::UnboundChild(_)));
    }

    #[test]
    fn it_should_destroy_idempotently() {
        let store = RedbStore::temp("entity_destroy").expect("Failed to create temp store");
        let mut reading = Reading::new(3.0);
        reading.bind("sensor-1");

        // never persisted: nothing to delete
        Reading::new(0.0).destroy(&store).expect("destroying an unsaved child must be a no-op");

        reading.save(&store).expect("Failed to save");
        reading.destroy(&store).expect("Failed to destroy");
        reading.destroy(&store).expect("repeated destroy must not fail");

        let page = store.query_page("readings", "sensor-1", RANGE_KEY_FLOOR, None, 10).expect("Failed to query");
        assert!(page.records.is_empty());
    }
}
