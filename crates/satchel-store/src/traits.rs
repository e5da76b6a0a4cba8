use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use satchel_types::{Document, Value};

use crate::error::StoreResult;

/// Inclusion/exclusion projection: field name to keep (`true`) or drop
/// (`false`). Mixing modes is a caller error; backends follow whichever mode
/// the first entry uses. `_id` survives inclusion projections unless
/// explicitly excluded.
pub type Projection = BTreeMap<String, bool>;

/// Sort direction for one key of a sort specification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Options for a `find` execution.
#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    pub filter: Document,
    pub projection: Option<Projection>,
    pub sort: Vec<(String, SortOrder)>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

/// One atomic per-document update: exactly the operator sets present in a
/// mutation entry. Applied in field order within each operator; operators
/// apply in declaration order below.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateSpec {
    /// Field assignments.
    pub set: Document,
    /// Fields to remove.
    pub unset: Vec<String>,
    /// Numeric deltas; a missing field starts at zero.
    pub inc: Document,
    /// Single-value array appends.
    pub push: Document,
    /// Whole-array appends; each value must be an array.
    pub push_all: Document,
    /// Add-each membership appends: every listed element is appended unless
    /// already present. Callers wanting "add this array as one element" must
    /// wrap it themselves.
    pub add_to_set: BTreeMap<String, Vec<Value>>,
    /// Array pops: `1` removes the last element, `-1` the first.
    pub pop: BTreeMap<String, i64>,
    /// Remove every array element equal to any listed value.
    pub pull_all: BTreeMap<String, Vec<Value>>,
}

impl UpdateSpec {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.unset.is_empty()
            && self.inc.is_empty()
            && self.push.is_empty()
            && self.push_all.is_empty()
            && self.add_to_set.is_empty()
            && self.pop.is_empty()
            && self.pull_all.is_empty()
    }
}

/// Map-reduce descriptor, passed through to the storage engine. The map,
/// reduce, and finalize sources are in whatever language the engine executes;
/// this layer only scopes and relays them.
#[derive(Clone, Debug)]
pub struct MapReduceJob {
    pub map: String,
    pub reduce: String,
    pub filter: Document,
    pub limit: Option<usize>,
    pub context: Option<Document>,
    pub finalize: Option<String>,
}

/// Schemaless document storage.
///
/// Invariants every backend must satisfy:
/// - Collections come into existence on first write; reads of unknown
///   collections behave as reads of empty ones.
/// - `insert` assigns a fresh `_id` when none is present and rejects a
///   colliding caller-supplied one.
/// - `find_and_modify` applies its whole [`UpdateSpec`] atomically with
///   respect to every other call addressing the same document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document, assigning `_id` if absent. Returns the document as
    /// stored.
    async fn insert(&self, collection: &str, document: Document) -> StoreResult<Document>;

    /// Find at most one document matching the filter.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
        projection: Option<&Projection>,
    ) -> StoreResult<Option<Document>>;

    /// Find all documents matching the options.
    async fn find(&self, collection: &str, options: &FindOptions) -> StoreResult<Vec<Document>>;

    /// Count documents matching the filter.
    async fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64>;

    /// Atomically apply `update` to the document whose `_id` equals `id`,
    /// returning the post-update document. With `upsert`, a missing document
    /// is created first (with that `_id`).
    async fn find_and_modify(
        &self,
        collection: &str,
        id: &Value,
        update: &UpdateSpec,
        upsert: bool,
    ) -> StoreResult<Document>;

    /// Remove the document whose `_id` equals `id`. Returns whether one
    /// existed.
    async fn remove(&self, collection: &str, id: &Value) -> StoreResult<bool>;

    /// Ensure an ascending index on `key`.
    async fn ensure_index(
        &self,
        collection: &str,
        key: &str,
        unique: bool,
        drop_dups: bool,
    ) -> StoreResult<()>;

    /// Drop a whole collection.
    async fn drop_collection(&self, collection: &str) -> StoreResult<()>;

    /// Drop every collection.
    async fn drop_database(&self) -> StoreResult<()>;

    /// Run a map-reduce job with inline results.
    async fn map_reduce(&self, collection: &str, job: &MapReduceJob)
        -> StoreResult<Vec<Document>>;

    /// Resolve a reference pointer (`{"$ref": collection, "$id": id}`) to
    /// the referenced document. `Ok(None)` when the target does not exist.
    async fn dereference(&self, pointer: &Value) -> StoreResult<Option<Document>>;
}

/// An in-progress blob write. At most one `write_chunk` may be outstanding;
/// the ingestion pipeline enforces this structurally.
#[async_trait]
pub trait BlobWriter: Send {
    async fn write_chunk(&mut self, chunk: Bytes) -> StoreResult<()>;

    /// Finish the blob and return its total length in bytes.
    async fn close(self: Box<Self>) -> StoreResult<u64>;
}

impl std::fmt::Debug for dyn BlobWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobWriter").finish_non_exhaustive()
    }
}

/// An open blob plus its metadata. The reader is finite, single-pass, and
/// not restartable.
pub struct BlobHandle {
    pub content_type: String,
    pub length: u64,
    reader: Box<dyn BlobChunks>,
}

impl BlobHandle {
    pub fn new(content_type: String, length: u64, reader: Box<dyn BlobChunks>) -> Self {
        Self {
            content_type,
            length,
            reader,
        }
    }

    /// Next chunk, or `None` when the sequence is exhausted.
    pub async fn next_chunk(&mut self) -> StoreResult<Option<Bytes>> {
        self.reader.next_chunk().await
    }
}

impl std::fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobHandle")
            .field("content_type", &self.content_type)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Chunk source backing a [`BlobHandle`].
#[async_trait]
pub trait BlobChunks: Send {
    async fn next_chunk(&mut self) -> StoreResult<Option<Bytes>>;
}

/// Named chunked binary object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open a write path for a new blob. Fails with a duplicate-key error if
    /// the name is taken.
    async fn create(&self, name: &str, content_type: &str) -> StoreResult<Box<dyn BlobWriter>>;

    /// Open a named blob for reading. `Ok(None)` if absent.
    async fn open(&self, name: &str) -> StoreResult<Option<BlobHandle>>;

    /// Pure existence check.
    async fn exists(&self, name: &str) -> StoreResult<bool>;

    /// Delete by name. Returns whether the blob existed.
    async fn delete(&self, name: &str) -> StoreResult<bool>;
}
