/// Collection and document addressing, plus collection queries.
use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use super::document::Document;

/// Slash-separated collection path, e.g. `users/u1/tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into().trim_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn doc(&self, id: impl Into<String>) -> DocRef {
        DocRef {
            collection: self.clone(),
            id: id.into(),
        }
    }

    /// Reference to a new document with a store-style generated id.
    pub fn new_doc(&self) -> DocRef {
        self.doc(generate_doc_id())
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a document id (uuid v4, simple form).
pub fn generate_doc_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
    pub collection: CollectionPath,
    pub id: String,
}

impl DocRef {
    /// Sub-collection nested under this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath::new(format!("{}/{}/{}", self.collection, self.id, name))
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// All documents of one collection, optionally ordered by a field.
/// Ordered queries exclude documents that lack the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: CollectionPath,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn all(collection: CollectionPath) -> Self {
        Self {
            collection,
            order_by: None,
        }
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    /// Filter and order a raw collection listing the way this query demands.
    pub fn apply(&self, mut docs: Vec<Document>) -> Vec<Document> {
        let Some(order_by) = &self.order_by else {
            return docs;
        };
        docs.retain(|d| d.fields.get(&order_by.field).map_or(false, |v| !v.is_null()));
        docs.sort_by(|a, b| {
            let ord = compare_values(&a.fields[&order_by.field], &b.fields[&order_by.field]);
            match order_by.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
        docs
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: by type first, then by value.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
