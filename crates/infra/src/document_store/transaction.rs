//! Client-side optimistic transaction over a [`DocumentStore`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use stockledger_core::ExpectedVersion;

use super::r#trait::{CommitReceipt, DocumentPath, DocumentStore, ReadSet, StoreError, WriteOp};

/// One transaction attempt.
///
/// - every first read of a path records the observed version in the read set
/// - repeated reads return the same snapshot; buffered writes are visible to
///   later reads (read-your-writes)
/// - nothing reaches the store until [`Transaction::commit`]
/// - once the attempt deadline passes, reads and the commit fail with
///   [`StoreError::Timeout`]
///
/// Dropping a transaction without committing discards it.
pub struct Transaction<'s> {
    store: &'s dyn DocumentStore,
    reads: ReadSet,
    snapshot: BTreeMap<DocumentPath, Option<JsonValue>>,
    writes: BTreeMap<DocumentPath, Option<JsonValue>>,
    deadline: Instant,
}

impl<'s> Transaction<'s> {
    pub fn begin(store: &'s dyn DocumentStore, timeout: Duration) -> Self {
        Self {
            store,
            reads: ReadSet::new(),
            snapshot: BTreeMap::new(),
            writes: BTreeMap::new(),
            deadline: Instant::now() + timeout,
        }
    }

    fn check_deadline(&self) -> Result<(), StoreError> {
        if Instant::now() >= self.deadline {
            return Err(StoreError::Timeout(
                "attempt exceeded its deadline".to_string(),
            ));
        }
        Ok(())
    }

    /// Read a raw document inside the transaction.
    pub fn get(&mut self, path: &DocumentPath) -> Result<Option<JsonValue>, StoreError> {
        self.check_deadline()?;

        if let Some(buffered) = self.writes.get(path) {
            return Ok(buffered.clone());
        }
        if let Some(seen) = self.snapshot.get(path) {
            return Ok(seen.clone());
        }

        let doc = self.store.get(path)?;
        self.reads
            .insert(path.clone(), ExpectedVersion::observed(doc.as_ref().map(|d| d.version)));
        let data = doc.map(|d| d.data);
        self.snapshot.insert(path.clone(), data.clone());
        Ok(data)
    }

    /// Read and deserialize a document inside the transaction.
    pub fn get_as<T: DeserializeOwned>(&mut self, path: &DocumentPath) -> Result<Option<T>, StoreError> {
        match self.get(path)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Serialization(format!("{path}: {e}"))),
            None => Ok(None),
        }
    }

    /// Buffer a full-document write.
    pub fn put<T: Serialize>(&mut self, path: &DocumentPath, value: &T) -> Result<(), StoreError> {
        let data = serde_json::to_value(value)
            .map_err(|e| StoreError::Serialization(format!("{path}: {e}")))?;
        self.writes.insert(path.clone(), Some(data));
        Ok(())
    }

    /// Buffer a delete.
    pub fn delete(&mut self, path: &DocumentPath) {
        self.writes.insert(path.clone(), None);
    }

    /// Validate the read set and apply all buffered writes atomically.
    pub fn commit(self) -> Result<CommitReceipt, StoreError> {
        self.check_deadline()?;

        let writes = self
            .writes
            .into_iter()
            .map(|(path, data)| match data {
                Some(data) => WriteOp::Put { path, data },
                None => WriteOp::Delete { path },
            })
            .collect();

        self.store.commit(&self.reads, writes)
    }
}

impl core::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transaction")
            .field("reads", &self.reads)
            .field("writes", &self.writes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::InMemoryDocumentStore;
    use serde_json::json;

    fn path(p: &str) -> DocumentPath {
        DocumentPath::new(p).unwrap()
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn buffered_writes_are_visible_before_commit_only_to_the_transaction() {
        let store = InMemoryDocumentStore::new();
        let mut tx = Transaction::begin(&store, TIMEOUT);

        tx.put(&path("entities/a"), &json!({"stock": "1"})).unwrap();

        assert_eq!(tx.get(&path("entities/a")).unwrap(), Some(json!({"stock": "1"})));
        assert!(store.get(&path("entities/a")).unwrap().is_none());

        tx.commit().unwrap();
        assert!(store.get(&path("entities/a")).unwrap().is_some());
    }

    #[test]
    fn concurrent_write_between_read_and_commit_conflicts() {
        let store = InMemoryDocumentStore::new();
        store.put_unchecked(path("entities/a"), json!(1)).unwrap();

        let mut tx = Transaction::begin(&store, TIMEOUT);
        assert_eq!(tx.get(&path("entities/a")).unwrap(), Some(json!(1)));

        store.put_unchecked(path("entities/a"), json!(2)).unwrap();

        // The transaction keeps its snapshot...
        assert_eq!(tx.get(&path("entities/a")).unwrap(), Some(json!(1)));
        tx.put(&path("entities/a"), &json!(10)).unwrap();

        // ...and the commit detects the lost update.
        let err = tx.commit().unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.get(&path("entities/a")).unwrap().unwrap().data, json!(2));
    }

    #[test]
    fn reading_a_missing_document_conflicts_with_its_creation() {
        let store = InMemoryDocumentStore::new();
        let mut tx = Transaction::begin(&store, TIMEOUT);
        assert_eq!(tx.get(&path("batches/x")).unwrap(), None);

        store.put_unchecked(path("batches/x"), json!(1)).unwrap();

        tx.put(&path("batches/x"), &json!(2)).unwrap();
        assert!(matches!(tx.commit(), Err(StoreError::Conflict { actual: Some(1), .. })));
    }

    #[test]
    fn expired_attempt_times_out() {
        let store = InMemoryDocumentStore::new();
        let mut tx = Transaction::begin(&store, Duration::ZERO);
        assert!(matches!(tx.get(&path("entities/a")), Err(StoreError::Timeout(_))));
        assert!(matches!(tx.commit(), Err(StoreError::Timeout(_))));
    }
}
