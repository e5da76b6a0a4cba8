//! Flow-controlled chunked blob ingestion and streaming.
//!
//! The write path is a per-session state machine fed through a bounded
//! capacity-1 channel: the transport cannot enqueue a second chunk until the
//! previous store write finished, so "at most one outstanding write" holds
//! structurally rather than by counter bookkeeping. Aborted sessions clean up
//! after themselves, so no partial blob survives a dropped connection.
//!
//! The read path yields a finite, single-pass chunk sequence the transport
//! relays verbatim.

pub mod maint;
pub mod pipeline;
pub mod stream;

pub use pipeline::{
    event_channel, BlobPipeline, SessionState, UploadEvent, UploadOutcome,
};
pub use stream::into_byte_stream;
