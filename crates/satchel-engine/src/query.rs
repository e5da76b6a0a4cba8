//! Query translator: declarative descriptors to store-native execution.

use std::sync::Arc;

use satchel_store::{DocumentStore, FindOptions, MapReduceJob, Projection, SortOrder};
use satchel_types::{Document, Fault, FaultKind, FaultResult, ObjectId, Value, ID_FIELD};

use crate::codec;

/// Result-count threshold above which a query logs a performance warning.
const LARGE_RESULT_WARNING: usize = 1000;

/// Map-reduce descriptor as received on the wire.
#[derive(Clone, Debug)]
pub struct MapReduce {
    pub map: String,
    pub reduce: String,
    pub context: Option<Document>,
    pub finalize: Option<String>,
}

/// A declarative query: filter plus composition lists, reference fields to
/// resolve afterwards, projection, sort, pagination, an optional map-reduce
/// descriptor, and the mode flags.
#[derive(Clone, Debug, Default)]
pub struct QueryRequest {
    pub entity: String,
    pub filter: Document,
    pub or: Option<Vec<Value>>,
    pub and: Option<Vec<Value>>,
    pub ref_fields: Vec<String>,
    pub projection: Option<Projection>,
    pub sort: Vec<(String, SortOrder)>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub map_reduce: Option<MapReduce>,
    pub find_one: bool,
    pub count: bool,
}

impl QueryRequest {
    /// Parse one wire query body. The filter and composition lists pass
    /// through the field codec; `entity` is required.
    pub fn from_json(json: &serde_json::Value) -> FaultResult<Self> {
        let obj = json.as_object().ok_or_else(Fault::invalid_parameters)?;
        let entity = obj
            .get("entity")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(Fault::invalid_parameters)?
            .to_owned();

        let filter = match obj.get("q") {
            Some(serde_json::Value::Object(map)) => codec::decode_object(map)?,
            Some(_) => return Err(Fault::invalid_parameters()),
            None => Document::new(),
        };
        let branch_list = |name: &str| -> FaultResult<Option<Vec<Value>>> {
            match obj.get(name) {
                Some(serde_json::Value::Array(items)) => Ok(Some(
                    items
                        .iter()
                        .map(codec::decode)
                        .collect::<FaultResult<Vec<Value>>>()?,
                )),
                Some(serde_json::Value::Null) | None => Ok(None),
                Some(_) => Err(Fault::invalid_parameters()),
            }
        };

        let sort = obj
            .get("sort")
            .and_then(serde_json::Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(key, dir)| {
                        let order = if dir.as_i64() == Some(1) {
                            SortOrder::Ascending
                        } else {
                            SortOrder::Descending
                        };
                        (key.clone(), order)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let projection = obj
            .get("fieldInEx")
            .and_then(serde_json::Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(key, flag)| (key.clone(), flag.as_i64() != Some(0)))
                    .collect()
            });

        let map_reduce = match obj.get("mr") {
            Some(serde_json::Value::Object(mr)) => {
                let source = |name: &str| -> FaultResult<String> {
                    mr.get(name)
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_owned)
                        .ok_or_else(Fault::invalid_parameters)
                };
                Some(MapReduce {
                    map: source("map")?,
                    reduce: source("reduce")?,
                    context: match mr.get("context") {
                        Some(serde_json::Value::Object(ctx)) => Some(codec::decode_object(ctx)?),
                        _ => None,
                    },
                    finalize: mr
                        .get("finalize")
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_owned),
                })
            }
            _ => None,
        };

        Ok(Self {
            entity,
            filter,
            or: branch_list("or")?,
            and: branch_list("and")?,
            ref_fields: obj
                .get("refIncl")
                .and_then(serde_json::Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(serde_json::Value::as_str)
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            projection,
            sort,
            skip: obj.get("skip").and_then(serde_json::Value::as_u64).map(|n| n as usize),
            limit: obj.get("limit").and_then(serde_json::Value::as_u64).map(|n| n as usize),
            map_reduce,
            find_one: obj
                .get("findOne")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            count: obj
                .get("count")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
        })
    }
}

/// What a query produced: an integer count, or wire documents.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryOutcome {
    Count(u64),
    Documents(Vec<serde_json::Value>),
}

impl QueryOutcome {
    /// Wire body: a bare number for counts, an array otherwise.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::Count(n) => serde_json::Value::from(n),
            Self::Documents(docs) => serde_json::Value::Array(docs),
        }
    }
}

/// Runs [`QueryRequest`]s against the document store.
#[derive(Clone)]
pub struct QueryEngine {
    docs: Arc<dyn DocumentStore>,
}

impl QueryEngine {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    /// Execute a query in exactly one of its three modes: map-reduce, count,
    /// or standard find.
    pub async fn run(&self, mut request: QueryRequest) -> FaultResult<QueryOutcome> {
        if let Some(branches) = request.or.take() {
            request.filter.insert("$or".to_owned(), Value::Array(branches));
        }
        if let Some(branches) = request.and.take() {
            request.filter.insert("$and".to_owned(), Value::Array(branches));
        }
        convert_filter_ids(&mut request.filter)?;

        if let Some(mr) = request.map_reduce.take() {
            let job = MapReduceJob {
                map: mr.map,
                reduce: mr.reduce,
                filter: request.filter,
                limit: request.limit,
                context: mr.context,
                finalize: mr.finalize,
            };
            let results = self.docs.map_reduce(&request.entity, &job).await?;
            return Ok(QueryOutcome::Documents(encode_all(&results)));
        }

        if request.count {
            let n = self.docs.count(&request.entity, &request.filter).await?;
            return Ok(QueryOutcome::Count(n));
        }

        let options = FindOptions {
            filter: request.filter,
            projection: request.projection,
            sort: request.sort,
            skip: request.skip,
            limit: if request.find_one {
                Some(1)
            } else {
                request.limit
            },
        };
        let mut results = self.docs.find(&request.entity, &options).await?;

        if results.len() > LARGE_RESULT_WARNING {
            tracing::warn!(
                entity = %request.entity,
                results = results.len(),
                "query returned a large result set; consider tightening the filter"
            );
        }

        for document in &mut results {
            for field in &request.ref_fields {
                let Some(pointer) = document.get(field) else {
                    continue;
                };
                // Resolution failure leaves the unresolved pointer in place.
                match self.docs.dereference(pointer).await {
                    Ok(Some(resolved)) => {
                        document.insert(field.clone(), Value::Map(resolved));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(field = %field, error = %e, "reference resolution failed");
                    }
                }
            }
        }
        Ok(QueryOutcome::Documents(encode_all(&results)))
    }

    /// Re-fetch one document by collection and identifier.
    pub async fn refresh(&self, entity: &str, oid: &ObjectId) -> FaultResult<serde_json::Value> {
        let mut filter = Document::new();
        filter.insert(ID_FIELD.to_owned(), Value::Id(*oid));
        let document = self
            .docs
            .find_one(entity, &filter, None)
            .await
            .map_err(Fault::from)?
            .ok_or_else(Fault::not_found)?;
        Ok(serde_json::Value::Object(codec::encode_object(&document)))
    }

    /// Ensure an ascending index on one key.
    pub async fn ensure_index(
        &self,
        entity: &str,
        key: &str,
        unique: bool,
        drop_dups: bool,
    ) -> FaultResult<()> {
        self.docs
            .ensure_index(entity, key, unique, drop_dups)
            .await
            .map_err(Fault::from)
    }
}

/// Convert text identifiers in `_id` filter fields to their native form:
/// at the top level and inside `$or`/`$and` branch maps. Filters are not
/// deeply nested beyond composition in this protocol.
fn convert_filter_ids(filter: &mut Document) -> FaultResult<()> {
    if let Some(value) = filter.get_mut(ID_FIELD) {
        convert_id_value(value)?;
    }
    for key in ["$or", "$and"] {
        if let Some(Value::Array(branches)) = filter.get_mut(key) {
            for branch in branches {
                if let Value::Map(map) = branch {
                    if let Some(value) = map.get_mut(ID_FIELD) {
                        convert_id_value(value)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn convert_id_value(value: &mut Value) -> FaultResult<()> {
    if let Value::String(text) = value {
        *value = Value::Id(ObjectId::from_hex(text).map_err(|e| {
            Fault::with_detail(FaultKind::InvalidParameters, format!("bad _id filter: {e}"))
        })?);
    }
    Ok(())
}

fn encode_all(documents: &[Document]) -> Vec<serde_json::Value> {
    documents
        .iter()
        .map(|d| serde_json::Value::Object(codec::encode_object(d)))
        .collect()
}
