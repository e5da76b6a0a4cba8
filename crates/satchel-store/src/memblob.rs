use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobChunks, BlobHandle, BlobStore, BlobWriter};

/// Storage chunk size. Small enough that multi-chunk paths are exercised by
/// ordinary test payloads.
const CHUNK_SIZE: usize = 50 * 1024;

#[derive(Clone, Debug)]
struct StoredBlob {
    content_type: String,
    chunks: Vec<Bytes>,
    length: u64,
}

type BlobMap = Arc<RwLock<HashMap<String, StoredBlob>>>;

/// In-memory chunked blob store.
///
/// Writers buffer and re-chunk incoming data; a blob becomes visible only
/// when its writer is closed, matching the create/append/close contract.
pub struct MemoryBlobStore {
    blobs: BlobMap,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored (closed) blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn create(&self, name: &str, content_type: &str) -> StoreResult<Box<dyn BlobWriter>> {
        if self.blobs.read().expect("lock poisoned").contains_key(name) {
            return Err(StoreError::DuplicateKey(name.to_owned()));
        }
        Ok(Box::new(MemoryBlobWriter {
            name: name.to_owned(),
            content_type: content_type.to_owned(),
            chunks: Vec::new(),
            pending: Vec::new(),
            length: 0,
            blobs: Arc::clone(&self.blobs),
        }))
    }

    async fn open(&self, name: &str) -> StoreResult<Option<BlobHandle>> {
        let map = self.blobs.read().expect("lock poisoned");
        let Some(blob) = map.get(name) else {
            return Ok(None);
        };
        Ok(Some(BlobHandle::new(
            blob.content_type.clone(),
            blob.length,
            Box::new(MemoryBlobChunks {
                chunks: blob.chunks.clone().into_iter(),
            }),
        )))
    }

    async fn exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.blobs.read().expect("lock poisoned").contains_key(name))
    }

    async fn delete(&self, name: &str) -> StoreResult<bool> {
        Ok(self
            .blobs
            .write()
            .expect("lock poisoned")
            .remove(name)
            .is_some())
    }
}

impl std::fmt::Debug for MemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlobStore")
            .field("blob_count", &self.len())
            .finish()
    }
}

struct MemoryBlobWriter {
    name: String,
    content_type: String,
    chunks: Vec<Bytes>,
    pending: Vec<u8>,
    length: u64,
    blobs: BlobMap,
}

#[async_trait]
impl BlobWriter for MemoryBlobWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> StoreResult<()> {
        self.length += chunk.len() as u64;
        self.pending.extend_from_slice(&chunk);
        while self.pending.len() >= CHUNK_SIZE {
            let rest = self.pending.split_off(CHUNK_SIZE);
            let full = std::mem::replace(&mut self.pending, rest);
            self.chunks.push(Bytes::from(full));
        }
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> StoreResult<u64> {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.chunks.push(Bytes::from(tail));
        }
        let blob = StoredBlob {
            content_type: self.content_type,
            chunks: self.chunks,
            length: self.length,
        };
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(self.name, blob);
        Ok(self.length)
    }
}

struct MemoryBlobChunks {
    chunks: std::vec::IntoIter<Bytes>,
}

#[async_trait]
impl BlobChunks for MemoryBlobChunks {
    async fn next_chunk(&mut self) -> StoreResult<Option<Bytes>> {
        Ok(self.chunks.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(handle: &mut BlobHandle) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = handle.next_chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn write_close_read_round_trip() {
        let store = MemoryBlobStore::new();
        let mut writer = store.create("a.bin", "application/octet-stream").await.unwrap();
        writer.write_chunk(Bytes::from_static(b"hello ")).await.unwrap();
        writer.write_chunk(Bytes::from_static(b"world")).await.unwrap();
        let length = writer.close().await.unwrap();
        assert_eq!(length, 11);

        let mut handle = store.open("a.bin").await.unwrap().unwrap();
        assert_eq!(handle.content_type, "application/octet-stream");
        assert_eq!(handle.length, 11);
        assert_eq!(read_all(&mut handle).await, b"hello world");
    }

    #[tokio::test]
    async fn large_payload_is_rechunked() {
        let store = MemoryBlobStore::new();
        let payload = vec![0xabu8; CHUNK_SIZE * 2 + 17];
        let mut writer = store.create("big", "application/octet-stream").await.unwrap();
        writer.write_chunk(Bytes::from(payload.clone())).await.unwrap();
        writer.close().await.unwrap();

        let mut handle = store.open("big").await.unwrap().unwrap();
        let mut chunk_count = 0;
        let mut bytes = Vec::new();
        while let Some(chunk) = handle.next_chunk().await.unwrap() {
            assert!(chunk.len() <= CHUNK_SIZE);
            chunk_count += 1;
            bytes.extend_from_slice(&chunk);
        }
        assert_eq!(chunk_count, 3);
        assert_eq!(bytes, payload);
    }

    #[tokio::test]
    async fn invisible_until_closed() {
        let store = MemoryBlobStore::new();
        let mut writer = store.create("pending", "text/plain").await.unwrap();
        writer.write_chunk(Bytes::from_static(b"x")).await.unwrap();
        assert!(!store.exists("pending").await.unwrap());
        writer.close().await.unwrap();
        assert!(store.exists("pending").await.unwrap());
    }

    #[tokio::test]
    async fn create_rejects_existing_name() {
        let store = MemoryBlobStore::new();
        store
            .create("dup", "text/plain")
            .await
            .unwrap()
            .close()
            .await
            .unwrap();
        let err = store.create("dup", "text/plain").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn delete_and_open_missing() {
        let store = MemoryBlobStore::new();
        store
            .create("gone", "text/plain")
            .await
            .unwrap()
            .close()
            .await
            .unwrap();
        assert!(store.delete("gone").await.unwrap());
        assert!(!store.delete("gone").await.unwrap());
        assert!(store.open("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_blob_round_trip() {
        let store = MemoryBlobStore::new();
        let length = store
            .create("empty", "text/plain")
            .await
            .unwrap()
            .close()
            .await
            .unwrap();
        assert_eq!(length, 0);
        let mut handle = store.open("empty").await.unwrap().unwrap();
        assert_eq!(handle.length, 0);
        assert!(handle.next_chunk().await.unwrap().is_none());
    }
}
