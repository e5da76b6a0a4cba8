//! Document mutation and query translation engine for Satchel.
//!
//! This crate sits between the wire (JSON request bodies) and the storage
//! capability traits. It owns the places where real translation happens:
//!
//! - [`codec`] — wire marker fields to tagged values and back
//! - [`sequence`] — monotonic per-collection sequence numbers
//! - [`mutation`] — atomic multi-operator document updates
//! - [`query`] — filter/sort/projection/map-reduce dispatch with reference
//!   resolution
//! - [`publish`] — deterministic public-key addressing of private targets
//!
//! Everything here goes through [`satchel_store::DocumentStore`]; no engine
//! code assumes a concrete backend.

pub mod codec;
pub mod mutation;
pub mod publish;
pub mod query;
pub mod sequence;

pub use mutation::{MutationEngine, SaveEntry};
pub use publish::{PublishRegistry, PublishTarget, Resolved};
pub use query::{QueryEngine, QueryOutcome, QueryRequest};
pub use sequence::SequenceAllocator;
