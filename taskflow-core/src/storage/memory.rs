/// In-process store backend.
///
/// Keeps every collection in memory with:
/// - Monotonic version counter stamped on every snapshot
/// - Staged batch application (all operations or none)
/// - Server timestamps and increments resolved at commit time
/// - Per-collection broadcast channels for snapshot subscriptions
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::document::{Document, FieldValue, Fields, Snapshot};
use super::path::{CollectionPath, DocRef, Query};
use super::subscription::Subscription;
use super::{RemoteStore, StoreError, WriteBatch, WriteOp};
use crate::clock::{Clock, SystemClock};

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

type Collection = BTreeMap<String, Map<String, Value>>;

pub struct MemoryStore {
    /// collection path -> doc id -> fields
    collections: RwLock<HashMap<CollectionPath, Collection>>,
    /// collection path -> snapshot channel
    channels: Mutex<HashMap<CollectionPath, broadcast::Sender<Snapshot>>>,
    clock: Arc<dyn Clock>,
    /// Global version counter (monotonic, shared across all collections)
    next_version: AtomicU64,
    channel_capacity: usize,
    /// When set, every write fails with this reason.
    rejection: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            clock,
            next_version: AtomicU64::new(1),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            rejection: Mutex::new(None),
        }
    }

    /// Snapshot buffer per collection before slow subscribers lag.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Make every subsequent write fail (e.g. permissions revoked), or
    /// restore normal operation with `None`.
    pub fn reject_writes(&self, reason: Option<&str>) {
        if let Ok(mut guard) = self.rejection.lock() {
            *guard = reason.map(str::to_string);
        }
    }

    /// Number of live subscriptions on a collection.
    pub fn subscriber_count(&self, collection: &CollectionPath) -> usize {
        self.channels
            .lock()
            .ok()
            .and_then(|channels| channels.get(collection).map(|tx| tx.receiver_count()))
            .unwrap_or(0)
    }

    /// Number of collections with a snapshot channel.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().map(|channels| channels.len()).unwrap_or(0)
    }

    /// Current store version (the version the next commit will get).
    pub fn version(&self) -> u64 {
        self.next_version.load(Ordering::SeqCst)
    }

    fn next_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        let guard = self
            .rejection
            .lock()
            .map_err(|_| StoreError::Unavailable("rejection flag poisoned".into()))?;
        match guard.as_ref() {
            Some(reason) => Err(StoreError::Rejected(reason.clone())),
            None => Ok(()),
        }
    }

    fn channel(&self, collection: &CollectionPath) -> Result<broadcast::Sender<Snapshot>, StoreError> {
        let mut channels = self
            .channels
            .lock()
            .map_err(|_| StoreError::Unavailable("channel map poisoned".into()))?;
        Ok(channels
            .entry(collection.clone())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .clone())
    }

    /// Send to the collection's channel, if anyone ever subscribed. A channel
    /// whose receivers are all gone is dropped.
    fn publish(&self, collection: &CollectionPath, snapshot: Snapshot) -> Result<(), StoreError> {
        let mut channels = self
            .channels
            .lock()
            .map_err(|_| StoreError::Unavailable("channel map poisoned".into()))?;
        let Some(tx) = channels.get(collection) else {
            return Ok(());
        };
        if tx.send(snapshot).is_err() {
            channels.remove(collection);
            log::debug!("[taskflow.storage.subscription] Released channel for {}", collection);
        }
        Ok(())
    }

    fn listing(collection: &CollectionPath, docs: Option<&Collection>, version: u64) -> Snapshot {
        Snapshot {
            collection: collection.clone(),
            version,
            docs: docs
                .map(|docs| {
                    docs.iter()
                        .map(|(id, fields)| Document {
                            id: id.clone(),
                            fields: fields.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Resolve sentinels against the current stored fields.
    fn resolve(
        &self,
        doc: &DocRef,
        existing: Option<&Map<String, Value>>,
        fields: Fields,
        timestamp: &str,
    ) -> Result<Map<String, Value>, StoreError> {
        let mut resolved = Map::new();
        for (name, value) in fields.iter() {
            let value = match value {
                FieldValue::Value(v) => v.clone(),
                FieldValue::ServerTimestamp => Value::String(timestamp.to_string()),
                FieldValue::Increment(delta) => {
                    let current = match existing.and_then(|m| m.get(name)) {
                        None | Some(Value::Null) => 0.0,
                        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
                        Some(_) => {
                            return Err(StoreError::InvalidIncrement {
                                doc: doc.to_string(),
                                field: name.clone(),
                            })
                        }
                    };
                    serde_json::Number::from_f64(current + delta)
                        .map(Value::Number)
                        .ok_or_else(|| StoreError::InvalidIncrement {
                            doc: doc.to_string(),
                            field: name.clone(),
                        })?
                }
            };
            resolved.insert(name.clone(), value);
        }
        Ok(resolved)
    }

    /// Apply a list of operations atomically and notify subscribers.
    fn apply(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        self.check_writable()?;
        if ops.is_empty() {
            return Ok(());
        }

        let timestamp = self
            .clock
            .now()
            .to_rfc3339_opts(SecondsFormat::Micros, true);

        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Unavailable("collections poisoned".into()))?;

        // Stage touched collections so a failing op leaves the store untouched.
        let mut staged: HashMap<CollectionPath, Collection> = HashMap::new();
        for op in &ops {
            let path = &op.target().collection;
            if !staged.contains_key(path) {
                staged.insert(path.clone(), collections.get(path).cloned().unwrap_or_default());
            }
        }

        for op in ops {
            match op {
                WriteOp::Set(doc, fields) => {
                    let resolved = self.resolve(&doc, None, fields, &timestamp)?;
                    if let Some(coll) = staged.get_mut(&doc.collection) {
                        coll.insert(doc.id.clone(), resolved);
                    }
                }
                WriteOp::Update(doc, fields) => {
                    let coll = staged
                        .get_mut(&doc.collection)
                        .ok_or_else(|| StoreError::NotFound(doc.to_string()))?;
                    let existing = coll
                        .get(&doc.id)
                        .ok_or_else(|| StoreError::NotFound(doc.to_string()))?;
                    let resolved = self.resolve(&doc, Some(existing), fields, &timestamp)?;
                    if let Some(current) = coll.get_mut(&doc.id) {
                        current.extend(resolved);
                    }
                }
                WriteOp::Delete(doc) => {
                    if let Some(coll) = staged.get_mut(&doc.collection) {
                        coll.remove(&doc.id);
                    }
                }
            }
        }

        let version = self.next_version();
        let touched: HashSet<CollectionPath> = staged.keys().cloned().collect();
        for (path, coll) in staged {
            collections.insert(path, coll);
        }

        log::debug!(
            "[taskflow.storage.commit] Committed version {} touching {} collection(s)",
            version,
            touched.len()
        );

        // Notify while still holding the write lock so subscribers see
        // versions in commit order.
        for path in touched {
            let snapshot = Self::listing(&path, collections.get(&path), version);
            self.publish(&path, snapshot)?;
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, query: &Query) -> Result<Snapshot, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Unavailable("collections poisoned".into()))?;
        let version = self.version().saturating_sub(1);
        let snapshot = Self::listing(&query.collection, collections.get(&query.collection), version);
        Ok(Snapshot {
            docs: query.apply(snapshot.docs),
            ..snapshot
        })
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        // Hold the read lock while subscribing: no commit can slip between the
        // initial listing and the channel registration.
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Unavailable("collections poisoned".into()))?;
        let rx = self.channel(&query.collection)?.subscribe();
        let version = self.version().saturating_sub(1);
        let initial = Self::listing(&query.collection, collections.get(&query.collection), version);
        drop(collections);

        log::debug!(
            "[taskflow.storage.subscription] Subscribed to {}",
            query.collection
        );
        Ok(Subscription::new(query, initial, rx))
    }

    async fn insert(&self, collection: &CollectionPath, fields: Fields) -> Result<String, StoreError> {
        let doc = collection.new_doc();
        let id = doc.id.clone();
        self.apply(vec![WriteOp::Set(doc, fields)])?;
        Ok(id)
    }

    async fn update(&self, doc: &DocRef, fields: Fields) -> Result<(), StoreError> {
        self.apply(vec![WriteOp::Update(doc.clone(), fields)])
    }

    async fn delete(&self, doc: &DocRef) -> Result<(), StoreError> {
        self.apply(vec![WriteOp::Delete(doc.clone())])
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.apply(batch.into_ops())
    }
}
