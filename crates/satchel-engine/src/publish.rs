//! Publish registry: deterministic public-key addressing of private targets.
//!
//! Publishing computes a one-way 256-bit digest over the server secret, a
//! configured salt, and a canonical identifier of the target, and upserts a
//! registry entry under that key. Anyone holding the key can resolve it
//! anonymously; nobody can forge a key without the secret.

use std::sync::Arc;

use satchel_store::{DocumentStore, Projection, UpdateSpec};
use satchel_types::{
    Document, Fault, FaultResult, ObjectId, Value, ID_FIELD, PUBLIC_COLLECTION,
};

use crate::codec;

/// Domain prefix for the publish key digest.
const KEY_DOMAIN: &str = "satchel-publish-v1";

/// What a key grants access to: a whole blob, or a field selection of one
/// document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishTarget {
    Blob {
        name: String,
    },
    Document {
        entity: String,
        oid: ObjectId,
        fields: Vec<String>,
    },
}

impl PublishTarget {
    /// Parse from a wire body: `fileName` wins, else `entity` + `oid` with
    /// optional `fields`.
    pub fn from_json(json: &serde_json::Value) -> FaultResult<Self> {
        let obj = json.as_object().ok_or_else(Fault::invalid_parameters)?;
        if let Some(name) = obj.get("fileName").and_then(serde_json::Value::as_str) {
            return Ok(Self::Blob {
                name: name.to_owned(),
            });
        }
        let (Some(entity), Some(oid)) = (
            obj.get("entity").and_then(serde_json::Value::as_str),
            obj.get("oid").and_then(serde_json::Value::as_str),
        ) else {
            return Err(Fault::invalid_parameters());
        };
        Ok(Self::Document {
            entity: entity.to_owned(),
            oid: ObjectId::from_hex(oid)?,
            fields: obj
                .get("fields")
                .and_then(serde_json::Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(serde_json::Value::as_str)
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// Canonical identifier fed into the key digest. Document field lists are
    /// sorted first: the same selection always canonicalizes identically, no
    /// matter the order a client listed it in.
    pub fn canonical_id(&self) -> String {
        match self {
            Self::Blob { name } => format!("file:{name}"),
            Self::Document {
                entity,
                oid,
                fields,
            } => {
                let mut sorted = fields.clone();
                sorted.sort();
                format!("doc:{entity}:{oid}:{}", sorted.join(","))
            }
        }
    }
}

/// What a resolved key points at.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    /// Stream this blob (the read path of the blob pipeline).
    Blob { name: String },
    /// A single requested field, unwrapped to its bare value.
    Scalar(serde_json::Value),
    /// The projected document.
    Document(serde_json::Value),
}

/// Publishes targets and resolves keys back to them.
#[derive(Clone)]
pub struct PublishRegistry {
    docs: Arc<dyn DocumentStore>,
    secret: String,
    salt: String,
}

impl PublishRegistry {
    pub fn new(docs: Arc<dyn DocumentStore>, secret: impl Into<String>, salt: impl Into<String>) -> Self {
        Self {
            docs,
            secret: secret.into(),
            salt: salt.into(),
        }
    }

    /// The key a target publishes under: 64 hex characters, deterministic.
    pub fn key_for(&self, target: &PublishTarget) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(KEY_DOMAIN.as_bytes());
        hasher.update(b":");
        hasher.update(self.secret.as_bytes());
        hasher.update(self.salt.as_bytes());
        hasher.update(target.canonical_id().as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }

    /// Register (or re-register, idempotently) a target and return its key.
    pub async fn publish(&self, target: &PublishTarget) -> FaultResult<String> {
        let key = self.key_for(target);
        let mut set = Document::new();
        match target {
            PublishTarget::Blob { name } => {
                set.insert("isFile".to_owned(), Value::Bool(true));
                set.insert("name".to_owned(), Value::from(name.as_str()));
            }
            PublishTarget::Document {
                entity,
                oid,
                fields,
            } => {
                set.insert("isFile".to_owned(), Value::Bool(false));
                set.insert("entity".to_owned(), Value::from(entity.as_str()));
                set.insert("oid".to_owned(), Value::Id(*oid));
                set.insert(
                    "fields".to_owned(),
                    Value::Array(fields.iter().map(|f| Value::from(f.as_str())).collect()),
                );
            }
        }
        let update = UpdateSpec {
            set,
            ..Default::default()
        };
        self.docs
            .find_and_modify(PUBLIC_COLLECTION, &Value::from(key.as_str()), &update, true)
            .await?;
        Ok(key)
    }

    /// Resolve a key back to its target. `NotFound` for unknown keys and for
    /// document entries whose target has since been deleted.
    pub async fn resolve(&self, key: &str) -> FaultResult<Resolved> {
        let mut filter = Document::new();
        filter.insert(ID_FIELD.to_owned(), Value::from(key));
        let entry = self
            .docs
            .find_one(PUBLIC_COLLECTION, &filter, None)
            .await?
            .ok_or_else(Fault::not_found)?;

        if entry.get("isFile").and_then(Value::as_bool).unwrap_or(false) {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| Fault::operation_failed("registry entry has no blob name"))?;
            return Ok(Resolved::Blob {
                name: name.to_owned(),
            });
        }

        let entity = entry
            .get("entity")
            .and_then(Value::as_str)
            .ok_or_else(|| Fault::operation_failed("registry entry has no entity"))?;
        let oid = entry
            .get("oid")
            .and_then(Value::as_id)
            .ok_or_else(|| Fault::operation_failed("registry entry has no oid"))?;
        let fields: Vec<&str> = entry
            .get("fields")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let projection: Option<Projection> = if fields.is_empty() {
            None
        } else {
            Some(fields.iter().map(|f| (f.to_string(), true)).collect())
        };
        let mut filter = Document::new();
        filter.insert(ID_FIELD.to_owned(), Value::Id(*oid));
        let document = self
            .docs
            .find_one(entity, &filter, projection.as_ref())
            .await?
            .ok_or_else(Fault::not_found)?;

        if let [only] = fields.as_slice() {
            let value = document.get(*only).cloned().unwrap_or(Value::Null);
            return Ok(Resolved::Scalar(codec::encode(&value)));
        }
        Ok(Resolved::Document(serde_json::Value::Object(
            codec::encode_object(&document),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{MutationEngine, SaveEntry};
    use satchel_store::MemoryDocumentStore;
    use serde_json::json;

    fn registry(store: Arc<MemoryDocumentStore>) -> PublishRegistry {
        PublishRegistry::new(store as Arc<dyn DocumentStore>, "s".repeat(64), "salt")
    }

    async fn seeded_doc(store: &Arc<MemoryDocumentStore>) -> ObjectId {
        let mutations = MutationEngine::new(store.clone() as Arc<dyn DocumentStore>);
        let results = mutations
            .save(vec![SaveEntry::from_json(&json!({
                "entity": "profiles",
                "set": { "name": "ada", "email": "ada@example.com" },
            }))
            .unwrap()])
            .await
            .unwrap();
        ObjectId::from_hex(results[0]["_id"].as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn publish_is_idempotent() {
        let store = Arc::new(MemoryDocumentStore::new());
        let registry = registry(store.clone());
        let target = PublishTarget::Blob {
            name: "report.pdf".into(),
        };
        let key1 = registry.publish(&target).await.unwrap();
        let key2 = registry.publish(&target).await.unwrap();
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 64);
        // Exactly one registry entry.
        assert_eq!(store.len(PUBLIC_COLLECTION), 1);
    }

    #[tokio::test]
    async fn field_order_does_not_change_the_key() {
        let store = Arc::new(MemoryDocumentStore::new());
        let registry = registry(store);
        let oid = ObjectId::generate();
        let a = PublishTarget::Document {
            entity: "profiles".into(),
            oid,
            fields: vec!["name".into(), "email".into()],
        };
        let b = PublishTarget::Document {
            entity: "profiles".into(),
            oid,
            fields: vec!["email".into(), "name".into()],
        };
        assert_eq!(registry.key_for(&a), registry.key_for(&b));
    }

    #[tokio::test]
    async fn different_secrets_produce_different_keys() {
        let store = Arc::new(MemoryDocumentStore::new());
        let a = PublishRegistry::new(
            store.clone() as Arc<dyn DocumentStore>,
            "a".repeat(64),
            "salt",
        );
        let b = PublishRegistry::new(store as Arc<dyn DocumentStore>, "b".repeat(64), "salt");
        let target = PublishTarget::Blob { name: "x".into() };
        assert_ne!(a.key_for(&target), b.key_for(&target));
    }

    #[tokio::test]
    async fn resolve_blob_entry() {
        let store = Arc::new(MemoryDocumentStore::new());
        let registry = registry(store);
        let key = registry
            .publish(&PublishTarget::Blob {
                name: "movie.mp4".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            registry.resolve(&key).await.unwrap(),
            Resolved::Blob {
                name: "movie.mp4".into()
            }
        );
    }

    #[tokio::test]
    async fn resolve_single_field_unwraps_scalar() {
        let store = Arc::new(MemoryDocumentStore::new());
        let oid = seeded_doc(&store).await;
        let registry = registry(store);
        let key = registry
            .publish(&PublishTarget::Document {
                entity: "profiles".into(),
                oid,
                fields: vec!["name".into()],
            })
            .await
            .unwrap();
        assert_eq!(
            registry.resolve(&key).await.unwrap(),
            Resolved::Scalar(json!("ada"))
        );
    }

    #[tokio::test]
    async fn resolve_multi_field_returns_projected_document() {
        let store = Arc::new(MemoryDocumentStore::new());
        let oid = seeded_doc(&store).await;
        let registry = registry(store);
        let key = registry
            .publish(&PublishTarget::Document {
                entity: "profiles".into(),
                oid,
                fields: vec!["name".into(), "email".into()],
            })
            .await
            .unwrap();
        let Resolved::Document(doc) = registry.resolve(&key).await.unwrap() else {
            panic!("expected a document");
        };
        assert_eq!(doc["name"], json!("ada"));
        assert_eq!(doc["email"], json!("ada@example.com"));
        assert!(doc.get("_seq").is_none());
    }

    #[tokio::test]
    async fn resolve_unknown_key_is_not_found() {
        let store = Arc::new(MemoryDocumentStore::new());
        let registry = registry(store);
        let err = registry.resolve(&"0".repeat(64)).await.unwrap_err();
        assert_eq!(err.kind, satchel_types::FaultKind::NotFound);
    }

    #[test]
    fn target_parsing() {
        let blob = PublishTarget::from_json(&json!({ "fileName": "a.png" })).unwrap();
        assert_eq!(blob.canonical_id(), "file:a.png");

        let oid = ObjectId::generate();
        let doc = PublishTarget::from_json(&json!({
            "entity": "profiles",
            "oid": oid.to_hex(),
            "fields": ["b", "a"],
        }))
        .unwrap();
        assert_eq!(doc.canonical_id(), format!("doc:profiles:{oid}:a,b"));

        let err = PublishTarget::from_json(&json!({ "entity": "only" })).unwrap_err();
        assert_eq!(err.kind, satchel_types::FaultKind::InvalidParameters);
    }
}
