use std::sync::Arc;
use std::time::Duration;

use satchel_blob::BlobPipeline;
use satchel_engine::{MutationEngine, PublishRegistry, QueryEngine};
use satchel_store::{BlobStore, DocumentStore};

use crate::config::ServerConfig;

/// Everything a handler needs, assembled once at startup and passed around
/// as axum state. No globals.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub docs: Arc<dyn DocumentStore>,
    pub mutations: MutationEngine,
    pub queries: QueryEngine,
    pub registry: PublishRegistry,
    pub blobs: BlobPipeline,
}

impl AppContext {
    pub fn new(
        config: ServerConfig,
        docs: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let registry = PublishRegistry::new(
            Arc::clone(&docs),
            config.secret.clone(),
            config.salt.clone(),
        );
        let pipeline = BlobPipeline::new(blobs, Duration::from_secs(config.upload_timeout_secs));
        Self {
            config: Arc::new(config),
            mutations: MutationEngine::new(Arc::clone(&docs)),
            queries: QueryEngine::new(Arc::clone(&docs)),
            registry,
            blobs: pipeline,
            docs,
        }
    }
}
