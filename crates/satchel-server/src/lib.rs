//! HTTP server for Satchel.
//!
//! Exposes document persistence, querying, publishing, and chunked blob
//! streaming over a secret-gated REST surface. All state lives in an
//! [`AppContext`] assembled once at startup and threaded through axum.

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;

pub use config::{ServerConfig, TlsConfig};
pub use context::AppContext;
pub use error::{ApiError, ApiResult, ServerError, ServerResult};
pub use server::SatchelServer;
