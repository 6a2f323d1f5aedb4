pub mod document;
pub mod memory;
pub mod path;
pub mod subscription;

pub use document::{Document, FieldValue, Fields, Snapshot};
pub use path::{CollectionPath, Direction, DocRef, Query};
pub use subscription::Subscription;

use async_trait::async_trait;

/// Remote ordered document store.
/// Implementations: MemoryStore (in-process); a hosted realtime database
/// client plugs in behind the same trait.
///
/// Guarantees expected from every implementation:
/// - subscriptions deliver a full snapshot of the collection on every change,
///   starting with the current state;
/// - `commit` applies all operations of a batch or none of them;
/// - server timestamps are resolved from the store's clock at commit time;
/// - increments are applied against the stored value, so concurrent
///   increments sum instead of overwriting each other.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// One-shot read of a collection.
    async fn get(&self, query: &Query) -> Result<Snapshot, StoreError>;

    /// Subscribe to a collection. Dropping the subscription unsubscribes.
    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError>;

    /// Create a document with a generated id and return that id.
    async fn insert(&self, collection: &CollectionPath, fields: Fields) -> Result<String, StoreError>;

    /// Update fields of an existing document.
    async fn update(&self, doc: &DocRef, fields: Fields) -> Result<(), StoreError>;

    async fn delete(&self, doc: &DocRef) -> Result<(), StoreError>;

    /// Apply every operation of the batch atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Atomic numeric increment resolved by the store.
    async fn increment_field(&self, doc: &DocRef, field: &str, delta: f64) -> Result<(), StoreError> {
        self.update(doc, Fields::new().increment(field, delta)).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or replace the whole document.
    Set(DocRef, Fields),
    /// Merge fields into an existing document.
    Update(DocRef, Fields),
    Delete(DocRef),
}

impl WriteOp {
    pub fn target(&self) -> &DocRef {
        match self {
            WriteOp::Set(doc, _) | WriteOp::Update(doc, _) | WriteOp::Delete(doc) => doc,
        }
    }
}

/// Operations committed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, doc: DocRef, fields: Fields) -> Self {
        self.ops.push(WriteOp::Set(doc, fields));
        self
    }

    pub fn update(mut self, doc: DocRef, fields: Fields) -> Self {
        self.ops.push(WriteOp::Update(doc, fields));
        self
    }

    pub fn delete(mut self, doc: DocRef) -> Self {
        self.ops.push(WriteOp::Delete(doc));
        self
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Cannot increment non-numeric field {field} on {doc}")]
    InvalidIncrement { doc: String, field: String },

    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Subscription to {0} was closed")]
    SubscriptionClosed(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
