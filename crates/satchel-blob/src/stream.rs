//! Download path: open a stored blob and relay its chunks as a byte stream.

use bytes::Bytes;
use futures_util::stream::Stream;
use satchel_store::{BlobHandle, StoreError};
use satchel_types::{Fault, FaultKind, FaultResult};

use crate::pipeline::BlobPipeline;

impl BlobPipeline {
    /// Open a named blob for download. Absent names are a not-found fault,
    /// not an empty stream.
    pub async fn open(&self, name: &str) -> FaultResult<BlobHandle> {
        match self.store().open(name).await.map_err(Fault::from)? {
            Some(handle) => {
                tracing::debug!(
                    name = %name,
                    content_type = %handle.content_type,
                    length = handle.length,
                    "blob opened for streaming"
                );
                Ok(handle)
            }
            None => Err(Fault::with_detail(FaultKind::NotFound, name)),
        }
    }
}

/// Adapt a [`BlobHandle`] into a chunk stream suitable for an HTTP response
/// body. The handle is single-pass, so the stream is too.
pub fn into_byte_stream(handle: BlobHandle) -> impl Stream<Item = Result<Bytes, StoreError>> + Send {
    futures_util::stream::unfold(Some(handle), |state| async move {
        let mut handle = state?;
        match handle.next_chunk().await {
            Ok(Some(chunk)) => Some((Ok(chunk), Some(handle))),
            Ok(None) => None,
            // An error ends the stream after it is reported.
            Err(e) => Some((Err(e), None)),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use futures_util::StreamExt;
    use satchel_store::MemoryBlobStore;
    use satchel_types::FaultKind;

    use crate::pipeline::{event_channel, BlobPipeline, UploadEvent};

    fn pipeline() -> BlobPipeline {
        BlobPipeline::new(Arc::new(MemoryBlobStore::new()), Duration::from_secs(5))
    }

    async fn upload(pipeline: &BlobPipeline, name: &str, content_type: &str, payload: &[u8]) {
        let (tx, rx) = event_channel();
        let ingest = pipeline.ingest(Some(name.to_string()), content_type, rx);
        let payload = Bytes::copy_from_slice(payload);
        let feed = async move {
            tx.send(UploadEvent::Data(payload)).await.unwrap();
            tx.send(UploadEvent::End).await.unwrap();
        };
        let (outcome, ()) = tokio::join!(ingest, feed);
        outcome.unwrap();
    }

    #[tokio::test]
    async fn open_missing_is_not_found() {
        let err = pipeline().open("nope.bin").await.unwrap_err();
        assert_eq!(err.kind, FaultKind::NotFound);
    }

    #[tokio::test]
    async fn open_reports_metadata() {
        let p = pipeline();
        upload(&p, "report.pdf", "application/pdf", b"not really a pdf").await;

        let handle = p.open("report.pdf").await.unwrap();
        assert_eq!(handle.content_type, "application/pdf");
        assert_eq!(handle.length, 16);
    }

    #[tokio::test]
    async fn byte_stream_replays_full_payload() {
        let p = pipeline();
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        upload(&p, "big.bin", "application/octet-stream", &payload).await;

        let handle = p.open("big.bin").await.unwrap();
        let mut stream = std::pin::pin!(super::into_byte_stream(handle));
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, payload);
    }
}
