//! Mutation engine: batch document creation and multi-operator updates.

use std::collections::BTreeMap;
use std::sync::Arc;

use satchel_store::{DocumentStore, UpdateSpec};
use satchel_types::{
    Document, Fault, FaultResult, ObjectId, Value, ID_FIELD, SEQ_FIELD, UPDATED_FIELD,
};

use crate::codec;
use crate::sequence::SequenceAllocator;

/// One per-document update request: a target collection, an optional existing
/// identifier, and the operator sets present in the request.
#[derive(Clone, Debug, Default)]
pub struct SaveEntry {
    pub entity: String,
    pub oid: Option<ObjectId>,
    pub set: Document,
    pub unset: Vec<String>,
    pub inc: Document,
    pub push: Document,
    pub push_all: Document,
    pub add_to_set: Document,
    pub pop: BTreeMap<String, i64>,
    pub pull_all: BTreeMap<String, Vec<Value>>,
}

impl SaveEntry {
    /// Parse one wire entry. Value-bearing operator sets pass through the
    /// field codec; `entity` is required, a malformed `oid` is rejected.
    pub fn from_json(json: &serde_json::Value) -> FaultResult<Self> {
        let obj = json.as_object().ok_or_else(Fault::invalid_parameters)?;
        let entity = obj
            .get("entity")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(Fault::invalid_parameters)?
            .to_owned();
        let oid = obj
            .get("oid")
            .and_then(serde_json::Value::as_str)
            .map(ObjectId::from_hex)
            .transpose()?;

        Ok(Self {
            entity,
            oid,
            set: decoded_operator(obj, "set")?,
            unset: obj
                .get("unset")
                .and_then(serde_json::Value::as_object)
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default(),
            inc: decoded_operator(obj, "inc")?,
            push: decoded_operator(obj, "push")?,
            push_all: decoded_operator(obj, "pushAll")?,
            add_to_set: decoded_operator(obj, "addToSet")?,
            pop: obj
                .get("pop")
                .and_then(serde_json::Value::as_object)
                .map(|m| {
                    m.iter()
                        .map(|(k, v)| (k.clone(), v.as_i64().unwrap_or(1)))
                        .collect()
                })
                .unwrap_or_default(),
            pull_all: decoded_operator(obj, "pullAll")?
                .into_iter()
                .map(|(k, v)| match v {
                    Value::Array(items) => (k, items),
                    other => (k, vec![other]),
                })
                .collect(),
        })
    }

}

fn decoded_operator(
    obj: &serde_json::Map<String, serde_json::Value>,
    name: &str,
) -> FaultResult<Document> {
    match obj.get(name) {
        Some(serde_json::Value::Object(map)) => codec::decode_object(map),
        Some(_) => Err(Fault::with_detail(
            satchel_types::FaultKind::InvalidParameters,
            format!("operator '{name}' must be a mapping"),
        )),
        None => Ok(Document::new()),
    }
}

/// Applies ordered batches of [`SaveEntry`] requests.
#[derive(Clone)]
pub struct MutationEngine {
    docs: Arc<dyn DocumentStore>,
    sequences: SequenceAllocator,
}

impl MutationEngine {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        let sequences = SequenceAllocator::new(Arc::clone(&docs));
        Self { docs, sequences }
    }

    /// Apply a batch in input order, returning one wire document per entry.
    ///
    /// Fail-fast: the first failing entry stops the batch. Entries already
    /// applied stay committed, since the store's atomicity is per document
    /// and there is nothing to roll back with, but nothing after the failure
    /// is attempted.
    pub async fn save(&self, entries: Vec<SaveEntry>) -> FaultResult<Vec<serde_json::Value>> {
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            results.push(self.save_one(entry).await?);
        }
        Ok(results)
    }

    async fn save_one(&self, mut entry: SaveEntry) -> FaultResult<serde_json::Value> {
        let now = chrono::Utc::now().timestamp();
        entry
            .set
            .insert(UPDATED_FIELD.to_owned(), Value::Int(now));

        let is_new = entry.oid.is_none();
        let mut inserted = None;
        let id = match entry.oid {
            Some(oid) => Value::Id(oid),
            None => {
                // Creation: stamp the sequence number and fold `set` into the
                // insert itself.
                let seq = self.sequences.next(&entry.entity).await?;
                entry.set.insert(SEQ_FIELD.to_owned(), Value::Int(seq));
                let stored = self.docs.insert(&entry.entity, entry.set.clone()).await?;
                let id = stored
                    .get(ID_FIELD)
                    .cloned()
                    .ok_or_else(|| Fault::operation_failed("insert returned no identifier"))?;
                inserted = Some(stored);
                id
            }
        };

        let update = UpdateSpec {
            // `set` was already folded into the insert for a brand-new
            // document.
            set: if is_new { Document::new() } else { entry.set },
            unset: entry.unset,
            inc: entry.inc,
            push: entry.push,
            push_all: entry.push_all,
            add_to_set: entry
                .add_to_set
                .into_iter()
                .map(|(field, value)| match value {
                    // Array values mean "add each element", not "add the
                    // array as one element".
                    Value::Array(items) => (field, items),
                    single => (field, vec![single]),
                })
                .collect(),
            pop: entry.pop,
            pull_all: entry.pull_all,
        };

        let document = if update.is_empty() {
            inserted.ok_or_else(Fault::invalid_parameters)?
        } else {
            self.docs
                .find_and_modify(&entry.entity, &id, &update, true)
                .await?
        };
        Ok(serde_json::Value::Object(codec::encode_object(&document)))
    }

    /// Delete one document by collection and identifier.
    pub async fn delete(&self, entity: &str, oid: &ObjectId) -> FaultResult<()> {
        self.docs.remove(entity, &Value::Id(*oid)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_store::MemoryDocumentStore;
    use serde_json::json;

    fn engine() -> (Arc<MemoryDocumentStore>, MutationEngine) {
        let store = Arc::new(MemoryDocumentStore::new());
        let engine = MutationEngine::new(store.clone() as Arc<dyn DocumentStore>);
        (store, engine)
    }

    fn entry(json: serde_json::Value) -> SaveEntry {
        SaveEntry::from_json(&json).unwrap()
    }

    #[tokio::test]
    async fn creation_stamps_system_fields() {
        let (_, engine) = engine();
        let results = engine
            .save(vec![entry(json!({ "entity": "notes", "set": { "text": "hi" } }))])
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let doc = &results[0];
        assert_eq!(doc["text"], json!("hi"));
        assert_eq!(doc["_seq"], json!(1));
        assert!(doc["_updated"].as_i64().unwrap() > 0);
        assert_eq!(doc["_id"].as_str().unwrap().len(), 24);
    }

    #[tokio::test]
    async fn sequence_increments_per_creation() {
        let (_, engine) = engine();
        for expected in 1..=3 {
            let results = engine
                .save(vec![entry(json!({ "entity": "notes", "set": { "n": expected } }))])
                .await
                .unwrap();
            assert_eq!(results[0]["_seq"], json!(expected));
        }
    }

    #[tokio::test]
    async fn update_existing_keeps_seq() {
        let (_, engine) = engine();
        let created = engine
            .save(vec![entry(json!({ "entity": "notes", "set": { "text": "hi" } }))])
            .await
            .unwrap();
        let oid = created[0]["_id"].as_str().unwrap().to_owned();

        let updated = engine
            .save(vec![entry(
                json!({ "entity": "notes", "oid": oid, "inc": { "views": 1 } }),
            )])
            .await
            .unwrap();
        assert_eq!(updated[0]["views"], json!(1));
        assert_eq!(updated[0]["_seq"], json!(1));
        assert_eq!(updated[0]["text"], json!("hi"));
    }

    #[tokio::test]
    async fn operators_apply_in_one_entry() {
        let (_, engine) = engine();
        let created = engine
            .save(vec![entry(json!({
                "entity": "posts",
                "set": { "title": "draft", "tmp": 1, "tags": ["a"] },
            }))])
            .await
            .unwrap();
        let oid = created[0]["_id"].as_str().unwrap().to_owned();

        let updated = engine
            .save(vec![entry(json!({
                "entity": "posts",
                "oid": oid,
                "set": { "title": "final" },
                "unset": { "tmp": true },
                "push": { "tags": "b" },
                "pushAll": { "tags": ["c", "d"] },
                "addToSet": { "tags": ["a", "e"] },
                "pop": { "tags": 1 },
                "pullAll": { "tags": ["c"] },
            }))])
            .await
            .unwrap();

        let doc = &updated[0];
        assert_eq!(doc["title"], json!("final"));
        assert!(doc.get("tmp").is_none());
        // a, push b, pushAll c+d, addToSet adds e (a present), pop drops e,
        // pullAll drops c.
        assert_eq!(doc["tags"], json!(["a", "b", "d"]));
    }

    #[tokio::test]
    async fn add_to_set_single_value_adds_one_element() {
        let (_, engine) = engine();
        let created = engine
            .save(vec![entry(
                json!({ "entity": "posts", "set": { "tags": ["x"] } }),
            )])
            .await
            .unwrap();
        let oid = created[0]["_id"].as_str().unwrap().to_owned();

        let updated = engine
            .save(vec![entry(
                json!({ "entity": "posts", "oid": oid, "addToSet": { "tags": "y" } }),
            )])
            .await
            .unwrap();
        assert_eq!(updated[0]["tags"], json!(["x", "y"]));
    }

    #[tokio::test]
    async fn binary_fields_round_trip_through_save() {
        let (_, engine) = engine();
        let results = engine
            .save(vec![entry(json!({
                "entity": "files",
                "set": { "payload": { "dk:data": "aGVsbG8=" } },
            }))])
            .await
            .unwrap();
        // Stored as bytes, re-encoded to the same base64 on the way out.
        assert_eq!(results[0]["payload"]["dk:data"], json!("aGVsbG8="));
    }

    #[tokio::test]
    async fn upsert_with_caller_supplied_oid() {
        let (_, engine) = engine();
        let oid = ObjectId::generate().to_hex();
        let results = engine
            .save(vec![entry(
                json!({ "entity": "notes", "oid": oid, "set": { "text": "up" } }),
            )])
            .await
            .unwrap();
        assert_eq!(results[0]["_id"], json!(oid));
        assert_eq!(results[0]["text"], json!("up"));
        // Upserted documents get no sequence number; only creations do.
        assert!(results[0].get("_seq").is_none());
    }

    #[tokio::test]
    async fn batch_is_fail_fast() {
        let (store, engine) = engine();
        let created = engine
            .save(vec![entry(json!({ "entity": "t", "set": { "name": "x" } }))])
            .await
            .unwrap();
        let oid = created[0]["_id"].as_str().unwrap().to_owned();

        // Entry 2 increments a string field and fails; entry 3 must not run.
        let batch = vec![
            entry(json!({ "entity": "t", "set": { "a": 1 } })),
            entry(json!({ "entity": "t", "oid": oid, "inc": { "name": 1 } })),
            entry(json!({ "entity": "t", "set": { "b": 2 } })),
        ];
        let err = engine.save(batch).await.unwrap_err();
        assert_eq!(err.kind, satchel_types::FaultKind::OperationFailed);

        // First entry committed, third never ran: 2 originals + 1 from the
        // failed batch's first entry.
        assert_eq!(store.len("t"), 2);
    }

    #[tokio::test]
    async fn missing_entity_is_invalid() {
        let err = SaveEntry::from_json(&json!({ "set": { "a": 1 } })).unwrap_err();
        assert_eq!(err.kind, satchel_types::FaultKind::InvalidParameters);

        let err = SaveEntry::from_json(&json!({ "entity": "t", "oid": "zz" })).unwrap_err();
        assert_eq!(err.kind, satchel_types::FaultKind::InvalidParameters);
    }

    #[tokio::test]
    async fn delete_removes_document() {
        let (store, engine) = engine();
        let created = engine
            .save(vec![entry(json!({ "entity": "t", "set": { "a": 1 } }))])
            .await
            .unwrap();
        let oid = ObjectId::from_hex(created[0]["_id"].as_str().unwrap()).unwrap();
        engine.delete("t", &oid).await.unwrap();
        assert_eq!(store.len("t"), 0);
        // Deleting an absent document is not an error.
        engine.delete("t", &oid).await.unwrap();
    }

    #[tokio::test]
    async fn batch_creation_fail_fast_test_count_check() {
        // Guard the fail-fast store count assumption above: a batch of two
        // creations commits both.
        let (store, engine) = engine();
        engine
            .save(vec![
                entry(json!({ "entity": "t", "set": { "a": 1 } })),
                entry(json!({ "entity": "t", "set": { "b": 2 } })),
            ])
            .await
            .unwrap();
        assert_eq!(store.len("t"), 2);
    }

    // Worked example from the design discussion: first save gets _seq 1, a
    // follow-up inc leaves it unchanged.
    #[tokio::test]
    async fn notes_example() {
        let (_, engine) = engine();
        let first = engine
            .save(vec![entry(json!({ "entity": "examples", "set": { "text": "hi" } }))])
            .await
            .unwrap();
        assert_eq!(first[0]["_seq"], json!(1));

        let oid = first[0]["_id"].as_str().unwrap().to_owned();
        let second = engine
            .save(vec![entry(
                json!({ "entity": "examples", "oid": oid, "inc": { "views": 1 } }),
            )])
            .await
            .unwrap();
        assert_eq!(second[0]["views"], json!(1));
        assert_eq!(second[0]["_seq"], first[0]["_seq"]);
    }
}
