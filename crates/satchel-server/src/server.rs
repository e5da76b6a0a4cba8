use std::sync::Arc;

use satchel_store::{BlobStore, DocumentStore};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::context::AppContext;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// Satchel backend server.
pub struct SatchelServer {
    ctx: AppContext,
}

impl SatchelServer {
    pub fn new(
        config: ServerConfig,
        docs: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            ctx: AppContext::new(config, docs, blobs),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.ctx.clone())
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let bind_addr = self.ctx.config.bind_addr;
        let app = build_router(self.ctx);
        let listener = TcpListener::bind(&bind_addr).await?;
        tracing::info!("satchel listening on {bind_addr}");
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_store::{MemoryBlobStore, MemoryDocumentStore};

    fn server() -> SatchelServer {
        SatchelServer::new(
            ServerConfig::default(),
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryBlobStore::new()),
        )
    }

    #[test]
    fn server_construction() {
        assert_eq!(server().config().bind_addr, "127.0.0.1:3000".parse().unwrap());
    }

    #[test]
    fn router_builds() {
        let _router = server().router();
    }
}
