use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use stockledger_core::ExpectedVersion;

use super::r#trait::{
    CommitReceipt, DocumentPath, DocumentStore, ReadSet, StoreError, VersionedDocument, WriteOp,
};

/// Stored slot; `data == None` is a tombstone that keeps the version counter.
#[derive(Debug, Clone)]
struct Slot {
    version: u64,
    data: Option<JsonValue>,
}

#[derive(Debug, Default)]
struct State {
    docs: BTreeMap<DocumentPath, Slot>,
    sequence: u64,
}

/// In-memory transactional document store.
///
/// Intended for tests/dev. Commits validate-and-apply under a single write
/// lock, which makes them serializable.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    state: RwLock<State>,
    multi_document: bool,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self {
            state: RwLock::new(State::default()),
            multi_document: true,
        }
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses commits spanning more than one root tree, like a
    /// backend limited to single-document-group transactions.
    pub fn without_multi_document() -> Self {
        Self {
            multi_document: false,
            ..Self::default()
        }
    }

    fn live_version(slot: Option<&Slot>) -> Option<u64> {
        slot.and_then(|s| s.data.as_ref().map(|_| s.version))
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, path: &DocumentPath) -> Result<Option<VersionedDocument>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(state.docs.get(path).and_then(|slot| {
            slot.data.as_ref().map(|data| VersionedDocument {
                path: path.clone(),
                version: slot.version,
                data: data.clone(),
            })
        }))
    }

    fn list(&self, collection: &DocumentPath) -> Result<Vec<VersionedDocument>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(state
            .docs
            .range(collection.clone()..)
            .take_while(|(path, _)| path.as_str().starts_with(collection.as_str()))
            .filter(|(path, _)| path.is_direct_child_of(collection))
            .filter_map(|(path, slot)| {
                slot.data.as_ref().map(|data| VersionedDocument {
                    path: path.clone(),
                    version: slot.version,
                    data: data.clone(),
                })
            })
            .collect())
    }

    fn commit(&self, reads: &ReadSet, writes: Vec<WriteOp>) -> Result<CommitReceipt, StoreError> {
        if !self.multi_document {
            let roots: BTreeSet<&str> = writes.iter().map(|w| w.path().root_tree()).collect();
            if roots.len() > 1 {
                return Err(StoreError::Unsupported(format!(
                    "transaction spans {} document trees",
                    roots.len()
                )));
            }
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        // 1) Validate every observed version.
        for (path, expected) in reads {
            let actual = Self::live_version(state.docs.get(path));
            if !expected.matches(actual) {
                return Err(StoreError::Conflict {
                    path: path.clone(),
                    expected: *expected,
                    actual,
                });
            }
        }

        // 2) Apply all writes (nothing can fail past this point).
        let count = writes.len();
        for write in writes {
            match write {
                WriteOp::Put { path, data } => {
                    let slot = state.docs.entry(path).or_insert(Slot {
                        version: 0,
                        data: None,
                    });
                    slot.version += 1;
                    slot.data = Some(data);
                }
                WriteOp::Delete { path } => {
                    if let Some(slot) = state.docs.get_mut(&path) {
                        if slot.data.is_some() {
                            slot.version += 1;
                            slot.data = None;
                        }
                    }
                }
            }
        }

        state.sequence += 1;
        Ok(CommitReceipt {
            sequence: state.sequence,
            writes: count,
        })
    }

    fn supports_multi_document(&self) -> bool {
        self.multi_document
    }
}

impl InMemoryDocumentStore {
    /// Unconditional single-document put, for seeding and tests.
    pub fn put_unchecked(&self, path: DocumentPath, data: JsonValue) -> Result<CommitReceipt, StoreError> {
        let mut reads = ReadSet::new();
        reads.insert(path.clone(), ExpectedVersion::Any);
        self.commit(&reads, vec![WriteOp::Put { path, data }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> DocumentPath {
        DocumentPath::new(p).unwrap()
    }

    #[test]
    fn versions_start_at_one_and_increase() {
        let store = InMemoryDocumentStore::new();
        store.put_unchecked(path("entities/a"), json!({"n": 1})).unwrap();
        store.put_unchecked(path("entities/a"), json!({"n": 2})).unwrap();

        let doc = store.get(&path("entities/a")).unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.data, json!({"n": 2}));
    }

    #[test]
    fn stale_read_is_rejected_and_nothing_is_written() {
        let store = InMemoryDocumentStore::new();
        store.put_unchecked(path("entities/a"), json!(1)).unwrap();

        let mut reads = ReadSet::new();
        reads.insert(path("entities/a"), ExpectedVersion::Exact(1));
        store.put_unchecked(path("entities/a"), json!(2)).unwrap();

        let err = store
            .commit(
                &reads,
                vec![
                    WriteOp::Put { path: path("entities/a"), data: json!(3) },
                    WriteOp::Put { path: path("entities/a/movements/m"), data: json!("m") },
                ],
            )
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict { actual: Some(2), .. }));
        assert_eq!(store.get(&path("entities/a")).unwrap().unwrap().data, json!(2));
        assert!(store.get(&path("entities/a/movements/m")).unwrap().is_none());
    }

    #[test]
    fn recreated_document_does_not_reuse_versions() {
        let store = InMemoryDocumentStore::new();
        store.put_unchecked(path("entities/a"), json!(1)).unwrap();
        store
            .commit(&ReadSet::new(), vec![WriteOp::Delete { path: path("entities/a") }])
            .unwrap();
        assert!(store.get(&path("entities/a")).unwrap().is_none());

        store.put_unchecked(path("entities/a"), json!(1)).unwrap();
        assert_eq!(store.get(&path("entities/a")).unwrap().unwrap().version, 3);
    }

    #[test]
    fn list_returns_direct_children_only() {
        let store = InMemoryDocumentStore::new();
        store.put_unchecked(path("entities/a/movements/1"), json!(1)).unwrap();
        store.put_unchecked(path("entities/a/movements/2"), json!(2)).unwrap();
        store.put_unchecked(path("entities/a/movements/2/notes/x"), json!(0)).unwrap();
        store.put_unchecked(path("entities/b/movements/3"), json!(3)).unwrap();

        let docs = store.list(&path("entities/a/movements")).unwrap();
        let data: Vec<_> = docs.into_iter().map(|d| d.data).collect();
        assert_eq!(data, vec![json!(1), json!(2)]);
    }

    #[test]
    fn single_tree_store_rejects_cross_tree_commits() {
        let store = InMemoryDocumentStore::without_multi_document();
        let err = store
            .commit(
                &ReadSet::new(),
                vec![
                    WriteOp::Put { path: path("entities/a"), data: json!(1) },
                    WriteOp::Put { path: path("entities/b"), data: json!(1) },
                ],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));

        store
            .commit(
                &ReadSet::new(),
                vec![
                    WriteOp::Put { path: path("entities/a"), data: json!(1) },
                    WriteOp::Put { path: path("entities/a/movements/m"), data: json!(1) },
                ],
            )
            .unwrap();
    }
}
