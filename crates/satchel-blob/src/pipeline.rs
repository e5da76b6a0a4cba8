use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use satchel_store::BlobStore;
use satchel_types::{Fault, FaultKind, FaultResult};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// One event of an upload session.
#[derive(Debug)]
pub enum UploadEvent {
    /// A received chunk.
    Data(Bytes),
    /// Normal completion: everything buffered must still be flushed.
    End,
    /// Premature disconnect: stop accepting data and clean up.
    Close,
}

/// Session lifecycle. `Collecting` waits for an event, `Draining` has a
/// write in flight; the three right-hand states decide what `Closed` means.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Collecting,
    Draining,
    Finalizing,
    AbortingClose,
    AbortingOpenFailure,
    Closed,
}

/// A successfully finalized upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOutcome {
    /// The assigned name (client-pinned or generated).
    pub name: String,
    pub length: u64,
}

/// Bounded feed for one upload session. Capacity 1: a sender awaiting
/// `send` is the backpressure signal.
pub fn event_channel() -> (mpsc::Sender<UploadEvent>, mpsc::Receiver<UploadEvent>) {
    mpsc::channel(1)
}

/// Blob ingestion, streaming, and maintenance over a [`BlobStore`].
#[derive(Clone)]
pub struct BlobPipeline {
    blobs: Arc<dyn BlobStore>,
    /// Bounds time spent waiting in `Collecting`; a stalled client is
    /// treated as a premature close.
    collecting_timeout: Duration,
}

impl BlobPipeline {
    pub fn new(blobs: Arc<dyn BlobStore>, collecting_timeout: Duration) -> Self {
        Self {
            blobs,
            collecting_timeout,
        }
    }

    pub(crate) fn store(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    /// Drain one upload session into the store.
    ///
    /// The target name is `pinned` or a generated unique one; an existing
    /// blob of that name fails with `DuplicateKey` before any write path is
    /// opened. On `End` the blob is closed and reported; on `Close` (or a
    /// collecting timeout, or a failed write) the blob is closed and then
    /// deleted. If opening the write path itself failed, nothing was created
    /// and nothing is deleted.
    pub async fn ingest(
        &self,
        pinned: Option<String>,
        content_type: &str,
        mut events: mpsc::Receiver<UploadEvent>,
    ) -> FaultResult<UploadOutcome> {
        let name = pinned.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if self.blobs.exists(&name).await.map_err(Fault::from)? {
            return Err(Fault::with_detail(FaultKind::DuplicateKey, name));
        }

        let mut writer = match self.blobs.create(&name, content_type).await {
            Ok(writer) => writer,
            Err(e) => {
                tracing::warn!(name = %name, error = %e, "blob open failed");
                self.transition(&name, SessionState::AbortingOpenFailure);
                return Err(e.into());
            }
        };

        self.transition(&name, SessionState::Collecting);
        loop {
            let event = match timeout(self.collecting_timeout, events.recv()).await {
                Ok(Some(event)) => event,
                // A dropped sender is a disconnect; a timeout is a stalled
                // client. Both abort.
                Ok(None) => UploadEvent::Close,
                Err(_) => {
                    tracing::warn!(name = %name, "upload stalled, aborting");
                    UploadEvent::Close
                }
            };
            match event {
                UploadEvent::Data(chunk) => {
                    self.transition(&name, SessionState::Draining);
                    if let Err(e) = writer.write_chunk(chunk).await {
                        tracing::warn!(name = %name, error = %e, "chunk write failed");
                        return self.abort(&name, writer, e.into()).await;
                    }
                    self.transition(&name, SessionState::Collecting);
                }
                UploadEvent::End => {
                    self.transition(&name, SessionState::Finalizing);
                    let length = writer.close().await.map_err(Fault::from)?;
                    self.transition(&name, SessionState::Closed);
                    return Ok(UploadOutcome { name, length });
                }
                UploadEvent::Close => {
                    self.transition(&name, SessionState::AbortingClose);
                    return self
                        .abort(
                            &name,
                            writer,
                            Fault::with_detail(
                                FaultKind::OperationFailed,
                                "upload aborted before completion",
                            ),
                        )
                        .await;
                }
            }
        }
    }

    /// Close and delete a half-written blob, then report the abort cause.
    async fn abort(
        &self,
        name: &str,
        writer: Box<dyn satchel_store::BlobWriter>,
        cause: Fault,
    ) -> FaultResult<UploadOutcome> {
        // Close first so the store releases the write path, then remove.
        if let Err(e) = writer.close().await {
            tracing::debug!(name = %name, error = %e, "close during abort failed");
        }
        if let Err(e) = self.blobs.delete(name).await {
            tracing::warn!(name = %name, error = %e, "cleanup delete failed");
        }
        self.transition(name, SessionState::Closed);
        Err(cause)
    }

    fn transition(&self, name: &str, state: SessionState) {
        tracing::debug!(name = %name, state = ?state, "upload session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_store::MemoryBlobStore;

    fn pipeline(store: Arc<MemoryBlobStore>) -> BlobPipeline {
        BlobPipeline::new(store, Duration::from_secs(5))
    }

    async fn feed(tx: mpsc::Sender<UploadEvent>, chunks: Vec<&'static [u8]>, terminal: UploadEvent) {
        for chunk in chunks {
            tx.send(UploadEvent::Data(Bytes::from_static(chunk)))
                .await
                .unwrap();
        }
        tx.send(terminal).await.unwrap();
    }

    #[tokio::test]
    async fn normal_upload_completes() {
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline = pipeline(store.clone());
        let (tx, rx) = event_channel();

        let sender = tokio::spawn(feed(tx, vec![b"hello ", b"world"], UploadEvent::End));
        let outcome = pipeline
            .ingest(Some("greeting.txt".into()), "text/plain", rx)
            .await
            .unwrap();
        sender.await.unwrap();

        assert_eq!(outcome.name, "greeting.txt");
        assert_eq!(outcome.length, 11);
        assert!(store.exists("greeting.txt").await.unwrap());
    }

    #[tokio::test]
    async fn generated_name_when_unpinned() {
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline = pipeline(store.clone());
        let (tx, rx) = event_channel();

        tokio::spawn(feed(tx, vec![b"x"], UploadEvent::End));
        let outcome = pipeline.ingest(None, "text/plain", rx).await.unwrap();
        assert!(!outcome.name.is_empty());
        assert!(store.exists(&outcome.name).await.unwrap());
    }

    #[tokio::test]
    async fn premature_close_leaves_no_blob() {
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline = pipeline(store.clone());
        let (tx, rx) = event_channel();

        tokio::spawn(feed(tx, vec![b"partial data"], UploadEvent::Close));
        let err = pipeline
            .ingest(Some("dropped.bin".into()), "application/octet-stream", rx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FaultKind::OperationFailed);
        assert!(!store.exists("dropped.bin").await.unwrap());
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_close() {
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline = pipeline(store.clone());
        let (tx, rx) = event_channel();

        tokio::spawn(async move {
            tx.send(UploadEvent::Data(Bytes::from_static(b"abc")))
                .await
                .unwrap();
            // Sender dropped without a terminal event.
        });
        let err = pipeline
            .ingest(Some("vanished".into()), "text/plain", rx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FaultKind::OperationFailed);
        assert!(!store.exists("vanished").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_name_fails_before_open() {
        let store = Arc::new(MemoryBlobStore::new());
        store
            .create("taken", "text/plain")
            .await
            .unwrap()
            .close()
            .await
            .unwrap();

        let pipeline = pipeline(store.clone());
        let (_tx, rx) = event_channel();
        let err = pipeline
            .ingest(Some("taken".into()), "text/plain", rx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FaultKind::DuplicateKey);
        // The existing blob is untouched.
        assert!(store.exists("taken").await.unwrap());
    }

    #[tokio::test]
    async fn collecting_timeout_aborts() {
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline = BlobPipeline::new(store.clone(), Duration::from_millis(20));
        let (tx, rx) = event_channel();

        // Send one chunk, then stall for longer than the timeout.
        tokio::spawn(async move {
            tx.send(UploadEvent::Data(Bytes::from_static(b"start")))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            drop(tx);
        });
        let err = pipeline
            .ingest(Some("stalled".into()), "text/plain", rx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FaultKind::OperationFailed);
        assert!(!store.exists("stalled").await.unwrap());
    }

    #[tokio::test]
    async fn empty_upload_is_valid() {
        let store = Arc::new(MemoryBlobStore::new());
        let pipeline = pipeline(store.clone());
        let (tx, rx) = event_channel();

        tokio::spawn(feed(tx, vec![], UploadEvent::End));
        let outcome = pipeline
            .ingest(Some("empty".into()), "text/plain", rx)
            .await
            .unwrap();
        assert_eq!(outcome.length, 0);
        assert!(store.exists("empty").await.unwrap());
    }

    #[tokio::test]
    async fn capacity_one_channel_applies_backpressure() {
        let (tx, mut rx) = event_channel();
        tx.send(UploadEvent::Data(Bytes::from_static(b"first")))
            .await
            .unwrap();
        // The channel is full: a second send must not complete until the
        // drain side takes the first chunk.
        let second = tx.try_send(UploadEvent::Data(Bytes::from_static(b"second")));
        assert!(second.is_err());
        rx.recv().await.unwrap();
        tx.try_send(UploadEvent::Data(Bytes::from_static(b"second")))
            .unwrap();
    }
}
