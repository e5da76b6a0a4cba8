//! Blob maintenance: deletion and existence checks.

use satchel_types::{Fault, FaultKind, FaultResult};

use crate::pipeline::BlobPipeline;

impl BlobPipeline {
    /// Delete a batch of blobs by name. Every name is attempted even when an
    /// earlier one fails; the last failure is surfaced. Names that do not
    /// exist are not an error.
    pub async fn unlink(&self, names: &[String]) -> FaultResult<()> {
        let mut last_error: Option<Fault> = None;
        for name in names {
            match self.store().delete(name).await {
                Ok(existed) => {
                    tracing::debug!(name = %name, existed, "blob unlinked");
                }
                Err(e) => {
                    tracing::warn!(name = %name, error = %e, "blob delete failed");
                    last_error = Some(Fault::from(e));
                }
            }
        }
        match last_error {
            Some(e) => Err(Fault::with_detail(
                FaultKind::OperationFailed,
                e.to_string(),
            )),
            None => Ok(()),
        }
    }

    /// Pure existence check by name.
    pub async fn exists(&self, name: &str) -> FaultResult<bool> {
        self.store().exists(name).await.map_err(Fault::from)
    }
}
