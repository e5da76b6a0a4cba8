use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use satchel_types::{Document, ObjectId, Value, ID_FIELD};

use crate::error::{StoreError, StoreResult};
use crate::traits::{
    DocumentStore, FindOptions, MapReduceJob, Projection, SortOrder, UpdateSpec,
};

/// In-memory, HashMap-based document store.
///
/// Intended for tests and embedding. Collections are vectors in insertion
/// order behind a single `RwLock`; `find_and_modify` holds the write lock for
/// its whole read-apply-write step, which is the atomic single-document
/// compare-and-modify primitive the engine relies on.
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    indexes: RwLock<HashMap<String, Vec<IndexSpec>>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct IndexSpec {
    key: String,
    unique: bool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Number of documents in a collection (0 for unknown collections).
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .expect("lock poisoned")
            .get(collection)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Declared indexes for a collection, as `(key, unique)` pairs.
    pub fn index_keys(&self, collection: &str) -> Vec<(String, bool)> {
        self.indexes
            .read()
            .expect("lock poisoned")
            .get(collection)
            .map(|specs| specs.iter().map(|s| (s.key.clone(), s.unique)).collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, collection: &str, mut document: Document) -> StoreResult<Document> {
        let mut map = self.collections.write().expect("lock poisoned");
        let docs = map.entry(collection.to_owned()).or_default();
        match document.get(ID_FIELD) {
            Some(id) => {
                if docs.iter().any(|d| d.get(ID_FIELD) == Some(id)) {
                    return Err(StoreError::DuplicateKey(format!("{collection}:{id:?}")));
                }
            }
            None => {
                document.insert(ID_FIELD.to_owned(), Value::Id(ObjectId::generate()));
            }
        }
        docs.push(document.clone());
        Ok(document)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
        projection: Option<&Projection>,
    ) -> StoreResult<Option<Document>> {
        let map = self.collections.read().expect("lock poisoned");
        let found = map
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| matches(d, filter)))
            .map(|d| project(d, projection));
        Ok(found)
    }

    async fn find(&self, collection: &str, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let map = self.collections.read().expect("lock poisoned");
        let mut results: Vec<Document> = map
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| matches(d, &options.filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !options.sort.is_empty() {
            results.sort_by(|a, b| compare_by(a, b, &options.sort));
        }
        let skip = options.skip.unwrap_or(0);
        let results: Vec<Document> = results
            .into_iter()
            .skip(skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|d| project(&d, options.projection.as_ref()))
            .collect();
        Ok(results)
    }

    async fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        let map = self.collections.read().expect("lock poisoned");
        let n = map
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, filter)).count())
            .unwrap_or(0);
        Ok(n as u64)
    }

    async fn find_and_modify(
        &self,
        collection: &str,
        id: &Value,
        update: &UpdateSpec,
        upsert: bool,
    ) -> StoreResult<Document> {
        let mut map = self.collections.write().expect("lock poisoned");
        let docs = map.entry(collection.to_owned()).or_default();
        let position = docs.iter().position(|d| d.get(ID_FIELD) == Some(id));
        let position = match position {
            Some(p) => p,
            None if upsert => {
                let mut fresh = Document::new();
                fresh.insert(ID_FIELD.to_owned(), id.clone());
                docs.push(fresh);
                docs.len() - 1
            }
            None => return Err(StoreError::NotFound(format!("{collection}:{id:?}"))),
        };
        apply_update(&mut docs[position], update)?;
        Ok(docs[position].clone())
    }

    async fn remove(&self, collection: &str, id: &Value) -> StoreResult<bool> {
        let mut map = self.collections.write().expect("lock poisoned");
        let Some(docs) = map.get_mut(collection) else {
            return Ok(false);
        };
        match docs.iter().position(|d| d.get(ID_FIELD) == Some(id)) {
            Some(p) => {
                docs.remove(p);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ensure_index(
        &self,
        collection: &str,
        key: &str,
        unique: bool,
        _drop_dups: bool,
    ) -> StoreResult<()> {
        let mut indexes = self.indexes.write().expect("lock poisoned");
        let specs = indexes.entry(collection.to_owned()).or_default();
        let spec = IndexSpec {
            key: key.to_owned(),
            unique,
        };
        if !specs.contains(&spec) {
            specs.push(spec);
        }
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.collections
            .write()
            .expect("lock poisoned")
            .remove(collection);
        self.indexes
            .write()
            .expect("lock poisoned")
            .remove(collection);
        Ok(())
    }

    async fn drop_database(&self) -> StoreResult<()> {
        self.collections.write().expect("lock poisoned").clear();
        self.indexes.write().expect("lock poisoned").clear();
        Ok(())
    }

    async fn map_reduce(
        &self,
        _collection: &str,
        _job: &MapReduceJob,
    ) -> StoreResult<Vec<Document>> {
        // Map/reduce sources run inside the storage engine; a HashMap
        // fixture has no interpreter for them.
        Err(StoreError::Unsupported("map-reduce"))
    }

    async fn dereference(&self, pointer: &Value) -> StoreResult<Option<Document>> {
        let Some(map) = pointer.as_map() else {
            return Err(StoreError::Backend(format!(
                "not a reference pointer: {}",
                pointer.type_name()
            )));
        };
        let (Some(collection), Some(id)) = (
            map.get("$ref").and_then(Value::as_str).map(str::to_owned),
            map.get("$id").cloned(),
        ) else {
            return Err(StoreError::Backend("not a reference pointer".into()));
        };
        let mut filter = Document::new();
        filter.insert(ID_FIELD.to_owned(), id);
        self.find_one(&collection, &filter, None).await
    }
}

impl std::fmt::Debug for MemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map = self.collections.read().expect("lock poisoned");
        f.debug_struct("MemoryDocumentStore")
            .field("collections", &map.len())
            .field("documents", &map.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Filter matching
// ---------------------------------------------------------------------------

fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$or" => condition.as_array().is_some_and(|branches| {
            branches
                .iter()
                .filter_map(Value::as_map)
                .any(|b| matches(document, b))
        }),
        "$and" => condition.as_array().is_some_and(|branches| {
            branches
                .iter()
                .filter_map(Value::as_map)
                .all(|b| matches(document, b))
        }),
        _ => field_matches(document.get(key), condition),
    })
}

fn field_matches(field: Option<&Value>, condition: &Value) -> bool {
    if let Some(ops) = operator_map(condition) {
        return ops.iter().all(|(op, operand)| {
            let ord = field.and_then(|f| value_cmp(f, operand));
            match op.as_str() {
                "$gt" => ord == Some(Ordering::Greater),
                "$gte" => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
                "$lt" => ord == Some(Ordering::Less),
                "$lte" => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                "$ne" => field != Some(operand),
                "$in" => operand
                    .as_array()
                    .is_some_and(|items| field.is_some_and(|f| items.contains(f))),
                _ => false,
            }
        });
    }
    match field {
        Some(value) => value == condition,
        // A missing field matches only an explicit null condition.
        None => condition.is_null(),
    }
}

/// A condition map whose keys all start with `$` is an operator set, not a
/// literal sub-document to equality-match.
fn operator_map(condition: &Value) -> Option<&Document> {
    condition
        .as_map()
        .filter(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

/// Weak cross-type ordering used for comparisons and sorting. Numeric values
/// compare across Int/Float; unlike types are incomparable.
fn value_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Float(_), _) | (_, Value::Float(_)) | (Value::Int(_), _) | (_, Value::Int(_)) => {
            a.as_f64().zip(b.as_f64()).and_then(|(x, y)| x.partial_cmp(&y))
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Id(x), Value::Id(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_by(a: &Document, b: &Document, sort: &[(String, SortOrder)]) -> Ordering {
    for (key, order) in sort {
        let ord = match (a.get(key), b.get(key)) {
            (Some(x), Some(y)) => value_cmp(x, y).unwrap_or(Ordering::Equal),
            // Absent fields sort before present ones.
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ord = match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

fn project(document: &Document, projection: Option<&Projection>) -> Document {
    let Some(projection) = projection.filter(|p| !p.is_empty()) else {
        return document.clone();
    };
    let inclusion = projection.values().next().copied().unwrap_or(true);
    if inclusion {
        document
            .iter()
            .filter(|(key, _)| {
                projection.get(*key).copied().unwrap_or(false)
                    || (*key == ID_FIELD && projection.get(ID_FIELD) != Some(&false))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    } else {
        document
            .iter()
            .filter(|(key, _)| projection.get(*key) != Some(&false))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Update application
// ---------------------------------------------------------------------------

fn apply_update(document: &mut Document, update: &UpdateSpec) -> StoreResult<()> {
    for (key, value) in &update.set {
        document.insert(key.clone(), value.clone());
    }
    for key in &update.unset {
        document.remove(key);
    }
    for (key, delta) in &update.inc {
        let current = document.get(key).cloned().unwrap_or(Value::Int(0));
        let next = match (&current, delta) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a + b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Value::Float(x + y),
                _ => {
                    return Err(StoreError::InvalidUpdate(format!(
                        "cannot increment {} field '{key}' by {}",
                        current.type_name(),
                        delta.type_name()
                    )))
                }
            },
        };
        document.insert(key.clone(), next);
    }
    for (key, value) in &update.push {
        array_field(document, key)?.push(value.clone());
    }
    for (key, values) in &update.push_all {
        let Some(items) = values.as_array() else {
            return Err(StoreError::InvalidUpdate(format!(
                "pushAll value for '{key}' must be an array"
            )));
        };
        array_field(document, key)?.extend(items.iter().cloned());
    }
    for (key, values) in &update.add_to_set {
        let array = array_field(document, key)?;
        for value in values {
            if !array.contains(value) {
                array.push(value.clone());
            }
        }
    }
    for (key, direction) in &update.pop {
        if let Some(existing) = document.get_mut(key) {
            let Value::Array(items) = existing else {
                return Err(StoreError::InvalidUpdate(format!(
                    "cannot pop non-array field '{key}'"
                )));
            };
            if !items.is_empty() {
                if *direction < 0 {
                    items.remove(0);
                } else {
                    items.pop();
                }
            }
        }
    }
    for (key, values) in &update.pull_all {
        if let Some(existing) = document.get_mut(key) {
            let Value::Array(items) = existing else {
                return Err(StoreError::InvalidUpdate(format!(
                    "cannot pull from non-array field '{key}'"
                )));
            };
            items.retain(|item| !values.contains(item));
        }
    }
    Ok(())
}

/// Mutable array view of a field, creating an empty array for missing fields.
fn array_field<'a>(document: &'a mut Document, key: &str) -> StoreResult<&'a mut Vec<Value>> {
    let entry = document
        .entry(key.to_owned())
        .or_insert_with(|| Value::Array(Vec::new()));
    match entry {
        Value::Array(items) => Ok(items),
        other => Err(StoreError::InvalidUpdate(format!(
            "field '{key}' is {}, not an array",
            other.type_name()
        ))),
    }
}
