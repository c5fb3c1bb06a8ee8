use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use stockledger_core::{Entity, ExpectedVersion};

/// Hierarchical document path: `collection/id[/collection/id...]`.
///
/// The first two segments name the document's **root tree**. A store that
/// cannot run multi-document transactions still commits atomically within one
/// root tree (an entity and its movements).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn new(path: impl Into<String>) -> Result<Self, StoreError> {
        let path = path.into();
        if path.is_empty() || path.split('/').any(|segment| segment.trim().is_empty()) {
            return Err(StoreError::InvalidPath(path));
        }
        Ok(Self(path))
    }

    /// Path of a top-level document: `{COLLECTION}/{id}`.
    pub fn root<E: Entity>(id: &E::Id) -> Self {
        Self(format!("{}/{}", E::COLLECTION, id))
    }

    /// Path of a document nested under this one: `{self}/{COLLECTION}/{id}`.
    pub fn child<E: Entity>(&self, id: &E::Id) -> Self {
        Self(format!("{}/{}/{}", self.0, E::COLLECTION, id))
    }

    /// Path of a nested collection under this document, used for listing.
    pub fn collection<E: Entity>(&self) -> Self {
        Self(format!("{}/{}", self.0, E::COLLECTION))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First two segments (`collection/id`).
    pub fn root_tree(&self) -> &str {
        match self.0.match_indices('/').nth(1) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }

    /// True if `self` is `collection/<id>` with no further nesting.
    pub fn is_direct_child_of(&self, collection: &DocumentPath) -> bool {
        self.0
            .strip_prefix(collection.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|id| !id.is_empty() && !id.contains('/'))
    }
}

impl core::fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document as currently stored, with its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedDocument {
    pub path: DocumentPath,
    /// Starts at 1 on first write, +1 per committed write; survives deletes
    /// (a recreated document never reuses an old version).
    pub version: u64,
    pub data: JsonValue,
}

/// One buffered mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { path: DocumentPath, data: JsonValue },
    Delete { path: DocumentPath },
}

impl WriteOp {
    pub fn path(&self) -> &DocumentPath {
        match self {
            WriteOp::Put { path, .. } | WriteOp::Delete { path } => path,
        }
    }
}

/// Versions a transaction observed; the commit fails unless all still hold.
pub type ReadSet = BTreeMap<DocumentPath, ExpectedVersion>;

/// Result of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Store-wide commit sequence number.
    pub sequence: u64,
    pub writes: usize,
}

/// Document store error.
///
/// `Conflict`, `Timeout` and `Unavailable` are transient: the whole transaction
/// may be retried. The rest are permanent for the given input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("write conflict on {path}: expected {expected:?}, found {actual:?}")]
    Conflict {
        path: DocumentPath,
        expected: ExpectedVersion,
        actual: Option<u64>,
    },

    #[error("transaction attempt timed out: {0}")]
    Timeout(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("invalid document path: {0:?}")]
    InvalidPath(String),

    #[error("document serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::Timeout(_) | StoreError::Unavailable(_)
        )
    }
}

/// Transactional document store with optimistic conflict detection.
///
/// ## Semantics
///
/// - `get` / `list` are point-in-time reads with no isolation guarantees
/// - `commit` is atomic: either every write lands or none do
/// - `commit` first checks every [`ReadSet`] entry against the current version
///   and fails with [`StoreError::Conflict`] on the first mismatch
/// - committed writes bump the document version by one
///
/// Transactions themselves are client-side (see [`super::Transaction`]); the
/// store only needs to validate-and-apply.
pub trait DocumentStore: Send + Sync {
    fn get(&self, path: &DocumentPath) -> Result<Option<VersionedDocument>, StoreError>;

    /// All live documents directly inside `collection`, ordered by path.
    fn list(&self, collection: &DocumentPath) -> Result<Vec<VersionedDocument>, StoreError>;

    fn commit(&self, reads: &ReadSet, writes: Vec<WriteOp>) -> Result<CommitReceipt, StoreError>;

    /// Whether one commit may span several root trees.
    fn supports_multi_document(&self) -> bool {
        true
    }
}

impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    fn get(&self, path: &DocumentPath) -> Result<Option<VersionedDocument>, StoreError> {
        (**self).get(path)
    }

    fn list(&self, collection: &DocumentPath) -> Result<Vec<VersionedDocument>, StoreError> {
        (**self).list(collection)
    }

    fn commit(&self, reads: &ReadSet, writes: Vec<WriteOp>) -> Result<CommitReceipt, StoreError> {
        (**self).commit(reads, writes)
    }

    fn supports_multi_document(&self) -> bool {
        (**self).supports_multi_document()
    }
}
