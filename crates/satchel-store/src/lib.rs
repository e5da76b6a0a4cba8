//! Storage capability traits for Satchel.
//!
//! The engine and pipeline crates never talk to a concrete storage engine;
//! they go through the two narrow capability traits defined here:
//!
//! - [`DocumentStore`] — schemaless collections with atomic single-document
//!   compare-and-modify, find/count, indexing, and reference dereferencing
//! - [`BlobStore`] — named chunked binary objects with a
//!   create/append/close/read/delete surface
//!
//! # Backends
//!
//! - [`MemoryDocumentStore`] / [`MemoryBlobStore`] — `HashMap`-based stores
//!   for tests and embedding
//!
//! # Design Rules
//!
//! 1. `find_and_modify` is atomic per document; callers rely on this for
//!    sequence allocation and conditional updates and add no locking of
//!    their own.
//! 2. The store never interprets marker field names; it receives and
//!    returns tagged [`satchel_types::Value`] trees.
//! 3. All backend errors are propagated as [`StoreError`], never absorbed.

pub mod error;
pub mod memblob;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memblob::MemoryBlobStore;
pub use memory::MemoryDocumentStore;
pub use traits::{
    BlobChunks, BlobHandle, BlobStore, BlobWriter, DocumentStore, FindOptions, MapReduceJob,
    Projection, SortOrder, UpdateSpec,
};
