//! Foundation types for Satchel.
//!
//! This crate provides the value model, identifiers, and error taxonomy used
//! throughout the Satchel system. Every other Satchel crate depends on
//! `satchel-types`.
//!
//! # Key Types
//!
//! - [`Value`] — Tagged field value: scalar, bytes, identifier, mapping, or
//!   sequence
//! - [`Document`] — A schemaless record: field name to [`Value`]
//! - [`ObjectId`] — Store-assigned 12-byte document identifier
//! - [`Fault`] / [`FaultKind`] — The uniform error taxonomy every component
//!   produces

pub mod fault;
pub mod oid;
pub mod value;

pub use fault::{Fault, FaultKind, FaultResult};
pub use oid::ObjectId;
pub use value::{doc, Document, Value};

/// Collection holding per-collection sequence counter records.
pub const SEQUENCE_COLLECTION: &str = "satchel.seq";

/// Collection holding public registry entries.
pub const PUBLIC_COLLECTION: &str = "satchel.pub";

/// Field name stamped with a Unix timestamp on every mutation carrying a set.
pub const UPDATED_FIELD: &str = "_updated";

/// Field name stamped once at creation with the collection sequence number.
pub const SEQ_FIELD: &str = "_seq";

/// Document identifier field.
pub const ID_FIELD: &str = "_id";
