use std::collections::BTreeMap;

use crate::oid::ObjectId;

/// A schemaless record: field name to [`Value`].
pub type Document = BTreeMap<String, Value>;

/// Tagged field value.
///
/// Every document field is one of these variants. Binary payloads and
/// identifiers are first-class variants rather than specially-shaped strings,
/// so engine code dispatches on the tag instead of inspecting magic field
/// names; the wire markers are interpreted once, at the codec boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Id(ObjectId),
    Array(Vec<Value>),
    Map(Document),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view. `Float` values with no fractional part do not coerce;
    /// the store keeps the numeric representation it was given.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<&ObjectId> {
        match self {
            Self::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Document> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Short variant name, used in error detail strings.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Id(_) => "id",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Self::Id(id)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<Document> for Value {
    fn from(map: Document) -> Self {
        Self::Map(map)
    }
}

/// Build a [`Document`] from `(key, value)` pairs.
pub fn doc<K, V, I>(fields: I) -> Document
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variants() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(7).as_i64(), Some(7));
        assert_eq!(Value::Int(7).as_f64(), Some(7.0));
        assert_eq!(Value::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::Float(1.0).as_i64(), None);
        assert_eq!(Value::String("x".into()).as_str(), Some("x"));
        assert!(Value::Null.as_map().is_none());
    }

    #[test]
    fn doc_builder() {
        let d = doc([("a", Value::Int(1)), ("b", Value::from("two"))]);
        assert_eq!(d.get("a"), Some(&Value::Int(1)));
        assert_eq!(d.get("b").and_then(Value::as_str), Some("two"));
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Bytes(vec![1]).type_name(), "bytes");
        assert_eq!(Value::Id(ObjectId::generate()).type_name(), "id");
        assert_eq!(Value::Array(vec![]).type_name(), "array");
    }
}
