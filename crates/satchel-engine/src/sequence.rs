use std::sync::Arc;

use satchel_store::{DocumentStore, StoreError, UpdateSpec};
use satchel_types::{Document, FaultResult, Value, ID_FIELD, SEQUENCE_COLLECTION};

/// Issues monotonically increasing per-collection sequence numbers.
///
/// One counter record per collection name lives in the sequence collection;
/// the atomic increment rides on the store's find-and-modify primitive, so no
/// two callers can ever observe the same value. Values may have gaps (an
/// aborted insert burns one) but never repeat or go backward.
#[derive(Clone)]
pub struct SequenceAllocator {
    docs: Arc<dyn DocumentStore>,
}

impl SequenceAllocator {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    /// Next sequence number for `collection`, starting at 1.
    pub async fn next(&self, collection: &str) -> FaultResult<i64> {
        let mut counter = Document::new();
        counter.insert(ID_FIELD.to_owned(), Value::from(collection));
        counter.insert("seq".to_owned(), Value::Int(0));
        match self.docs.insert(SEQUENCE_COLLECTION, counter).await {
            Ok(_) => {}
            // Lost the creation race; the record exists, which is all we need.
            Err(StoreError::DuplicateKey(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let mut update = UpdateSpec::default();
        update.inc.insert("seq".to_owned(), Value::Int(1));
        let counter = self
            .docs
            .find_and_modify(
                SEQUENCE_COLLECTION,
                &Value::from(collection),
                &update,
                false,
            )
            .await?;
        counter
            .get("seq")
            .and_then(Value::as_i64)
            .ok_or_else(|| satchel_types::Fault::operation_failed("counter record has no seq"))
    }
}
