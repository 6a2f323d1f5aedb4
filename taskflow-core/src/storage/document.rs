/// Document payloads exchanged with the remote store.
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::path::CollectionPath;
use super::StoreError;

/// A single field write. Server timestamps and increments are resolved by the
/// store at commit time, never from the client clock.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    ServerTimestamp,
    Increment(f64),
}

/// Field writes keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), FieldValue::Value(value.into()));
        self
    }

    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.0.insert(field.to_string(), FieldValue::ServerTimestamp);
        self
    }

    pub fn increment(mut self, field: &str, delta: f64) -> Self {
        self.0.insert(field.to_string(), FieldValue::Increment(delta));
        self
    }

    /// Every top-level field of a serializable struct. An `id` field is
    /// dropped since the id lives in the document path.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(
                map.into_iter()
                    .filter(|(k, _)| k != "id")
                    .map(|(k, v)| (k, FieldValue::Value(v)))
                    .collect(),
            )),
            other => Err(StoreError::InvalidDocument(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    /// Merge another set of writes over this one.
    pub fn merge(mut self, other: Fields) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }
}

/// A stored document: its id plus the resolved field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Decode into a typed entity; the document id is exposed as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut map = self.fields.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(map)).map_err(|e| {
            StoreError::InvalidDocument(format!("{}: {}", self.id, e))
        })
    }
}

/// Full point-in-time listing of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub collection: CollectionPath,
    /// Store version at which the snapshot was taken; increases with every commit.
    pub version: u64,
    pub docs: Vec<Document>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Decode every document, skipping (and logging) ones that do not fit `T`.
    pub fn decode_all<T: DeserializeOwned>(&self) -> Vec<T> {
        self.docs
            .iter()
            .filter_map(|doc| match doc.decode::<T>() {
                Ok(value) => Some(value),
                Err(e) => {
                    log::warn!(
                        "[taskflow.storage.decode] Skipping document in {}: {}",
                        self.collection,
                        e
                    );
                    None
                }
            })
            .collect()
    }
}
