/// Local mirrors of remote scopes.
///
/// A reducer turns each pushed snapshot into the local view, replacing the
/// previous view wholesale (no merge). `LiveMirror` pumps a subscription
/// through a reducer into a watch channel that views read from.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::storage::{Snapshot, Subscription};
use crate::types::{Column, Comment, Task};

/// Pure reducer over "latest snapshot" events.
pub trait SnapshotReducer: Send + 'static {
    type Output: Clone + Send + Sync + 'static;

    fn reduce(&mut self, snapshot: &Snapshot) -> Self::Output;
}

/// Columns of a board, in the order the subscription delivers (by `order`).
#[derive(Debug, Default)]
pub struct ColumnMirror;

impl SnapshotReducer for ColumnMirror {
    type Output = Vec<Column>;

    fn reduce(&mut self, snapshot: &Snapshot) -> Vec<Column> {
        snapshot.decode_all()
    }
}

/// Tasks of a board grouped by column, each group sorted by `order`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TasksByColumn {
    groups: BTreeMap<String, Vec<Task>>,
}

impl TasksByColumn {
    /// Group and sort an unordered task listing.
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut groups: BTreeMap<String, Vec<Task>> = BTreeMap::new();
        for task in tasks {
            groups.entry(task.column_id.clone()).or_default().push(task);
        }
        for group in groups.values_mut() {
            group.sort_by_key(|t| t.order);
        }
        Self { groups }
    }

    /// Tasks of one column; empty when the column has none.
    pub fn column(&self, column_id: &str) -> &[Task] {
        self.groups.get(column_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, task_id: &str) -> Option<&Task> {
        self.all().find(|t| t.id == task_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Task> {
        self.groups.values().flatten()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&String, &Vec<Task>)> {
        self.groups.iter()
    }

    /// Replace one column's sequence locally (optimistic reorder).
    pub fn replace_column(&mut self, column_id: &str, tasks: Vec<Task>) {
        self.groups.insert(column_id.to_string(), tasks);
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct TaskMirror;

impl SnapshotReducer for TaskMirror {
    type Output = TasksByColumn;

    fn reduce(&mut self, snapshot: &Snapshot) -> TasksByColumn {
        TasksByColumn::from_tasks(snapshot.decode_all::<Task>())
    }
}

/// Comments of a task, newest first (ordering comes from the query).
#[derive(Debug, Default)]
pub struct CommentMirror;

impl SnapshotReducer for CommentMirror {
    type Output = Vec<Comment>;

    fn reduce(&mut self, snapshot: &Snapshot) -> Vec<Comment> {
        snapshot.decode_all()
    }
}

/// What a view sees.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorView<T> {
    pub items: T,
    /// Version of the last applied snapshot; 0 until the first one arrives.
    pub version: u64,
    /// False while the items are an optimistic local edit.
    pub confirmed: bool,
}

impl<T> MirrorView<T> {
    pub fn is_loaded(&self) -> bool {
        self.version > 0 || self.confirmed
    }
}

/// Last server-confirmed view, plus the version an optimistic edit waits for.
struct Reconcile<T> {
    confirmed: MirrorView<T>,
    pending: Option<u64>,
}

/// A subscription pumped through a reducer into a watch channel.
/// Dropping the mirror (or calling `unsubscribe`) releases the subscription.
pub struct LiveMirror<T> {
    scope: String,
    tx: watch::Sender<MirrorView<T>>,
    reconcile: Arc<Mutex<Reconcile<T>>>,
    handle: JoinHandle<()>,
}

fn lock<T>(reconcile: &Mutex<Reconcile<T>>) -> MutexGuard<'_, Reconcile<T>> {
    reconcile.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone + Send + Sync + 'static> LiveMirror<T> {
    pub fn spawn<R>(mut subscription: Subscription, mut reducer: R, empty: T) -> Self
    where
        R: SnapshotReducer<Output = T>,
    {
        let scope = subscription.query().collection.to_string();
        let initial = MirrorView {
            items: empty,
            version: 0,
            confirmed: false,
        };
        let (tx, _rx) = watch::channel(initial.clone());
        let reconcile = Arc::new(Mutex::new(Reconcile {
            confirmed: initial,
            pending: None,
        }));

        let pump_tx = tx.clone();
        let pump_reconcile = reconcile.clone();
        let pump_scope = scope.clone();
        let handle = tokio::spawn(async move {
            loop {
                match subscription.next().await {
                    Ok(snapshot) => {
                        let view = MirrorView {
                            items: reducer.reduce(&snapshot),
                            version: snapshot.version,
                            confirmed: true,
                        };
                        let mut state = lock(&pump_reconcile);
                        state.confirmed = view.clone();
                        match state.pending {
                            Some(until) if snapshot.version < until => {
                                log::debug!(
                                    "[taskflow.mirror] {} at version {}, local edit waits for {}",
                                    pump_scope,
                                    snapshot.version,
                                    until
                                );
                            }
                            _ => {
                                state.pending = None;
                                log::debug!(
                                    "[taskflow.mirror] {} replaced with version {} ({} docs)",
                                    pump_scope,
                                    snapshot.version,
                                    snapshot.len()
                                );
                                pump_tx.send_replace(view);
                            }
                        }
                    }
                    Err(e) => {
                        log::error!(
                            "[taskflow.mirror] Subscription to {} failed, view is stale until resubscribed: {}",
                            pump_scope,
                            e
                        );
                        break;
                    }
                }
            }
        });

        Self {
            scope,
            tx,
            reconcile,
            handle,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Current view (cloned).
    pub fn current(&self) -> MirrorView<T> {
        self.tx.borrow().clone()
    }

    pub fn items(&self) -> T {
        self.tx.borrow().items.clone()
    }

    /// Receiver for views that react to changes.
    pub fn watch(&self) -> watch::Receiver<MirrorView<T>> {
        self.tx.subscribe()
    }

    /// Show a local edit until a snapshot at or beyond `until_version` is applied.
    ///
    /// Before the write, pass the current view's version plus one. After the
    /// write, pass the version it landed at; if that snapshot was already
    /// applied the confirmed view is shown straight away.
    pub fn apply_optimistic(&self, items: T, until_version: u64) {
        let mut state = lock(&self.reconcile);
        if state.confirmed.confirmed && state.confirmed.version >= until_version {
            state.pending = None;
            self.tx.send_replace(state.confirmed.clone());
            return;
        }
        state.pending = Some(until_version);
        self.tx.send_modify(|view| {
            view.items = items;
            view.confirmed = false;
        });
    }

    /// Whether snapshots are still flowing in.
    pub fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Wait until a confirmed view at or beyond `version` has been applied.
    pub async fn wait_for_version(&self, version: u64) -> MirrorView<T> {
        let mut rx = self.tx.subscribe();
        loop {
            {
                let view = rx.borrow_and_update();
                if view.version >= version && view.confirmed {
                    return view.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.current();
            }
        }
    }

    pub fn unsubscribe(self) {
        log::debug!("[taskflow.mirror] Releasing {}", self.scope);
    }
}

impl<T> Drop for LiveMirror<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::storage::{CollectionPath, Direction, Document, Fields, Query, RemoteStore, WriteBatch};
    use serde_json::{json, Map, Value};
    use tokio::sync::broadcast;

    fn task_doc(id: &str, column: &str, order: i64) -> Document {
        let mut fields = Map::new();
        fields.insert("title".into(), Value::from(id));
        fields.insert("columnId".into(), Value::from(column));
        fields.insert("order".into(), Value::from(order));
        Document {
            id: id.into(),
            fields,
        }
    }

    fn column_snapshot(version: u64, titles: &[&str]) -> Snapshot {
        let docs = titles
            .iter()
            .enumerate()
            .map(|(i, title)| {
                let mut fields = Map::new();
                fields.insert("title".into(), Value::from(*title));
                fields.insert("order".into(), Value::from(i as i64));
                Document {
                    id: title.to_lowercase(),
                    fields,
                }
            })
            .collect();
        Snapshot {
            collection: CollectionPath::new("users/u1/columns"),
            version,
            docs,
        }
    }

    fn titles(view: &MirrorView<Vec<Column>>) -> Vec<String> {
        view.items.iter().map(|c| c.title.clone()).collect()
    }

    /// Mirror fed by a channel the test controls.
    fn hand_fed_mirror(initial: Snapshot) -> (broadcast::Sender<Snapshot>, LiveMirror<Vec<Column>>) {
        let (tx, rx) = broadcast::channel(8);
        let query = Query::all(initial.collection.clone());
        let mirror = LiveMirror::spawn(Subscription::new(query, initial, rx), ColumnMirror, Vec::new());
        (tx, mirror)
    }

    #[test]
    fn test_task_mirror_groups_and_sorts() {
        let snapshot = Snapshot {
            collection: CollectionPath::new("users/u1/tasks"),
            version: 3,
            docs: vec![
                task_doc("b2", "B", 1),
                task_doc("a2", "A", 5),
                task_doc("b1", "B", 0),
                task_doc("a1", "A", 2),
            ],
        };
        let grouped = TaskMirror.reduce(&snapshot);
        let a: Vec<_> = grouped.column("A").iter().map(|t| t.id.as_str()).collect();
        let b: Vec<_> = grouped.column("B").iter().map(|t| t.id.as_str()).collect();
        assert_eq!(a, vec!["a1", "a2"]);
        assert_eq!(b, vec!["b1", "b2"]);
        assert!(grouped.column("C").is_empty());
        assert_eq!(grouped.len(), 4);
        assert!(grouped.find("a2").is_some());
    }

    #[test]
    fn test_reducer_replaces_wholesale() {
        let mut mirror = TaskMirror;
        let first = Snapshot {
            collection: CollectionPath::new("t"),
            version: 1,
            docs: vec![task_doc("x", "A", 0), task_doc("y", "A", 1)],
        };
        let second = Snapshot {
            collection: CollectionPath::new("t"),
            version: 2,
            docs: vec![task_doc("y", "A", 0)],
        };
        assert_eq!(mirror.reduce(&first).len(), 2);
        let after = mirror.reduce(&second);
        assert_eq!(after.len(), 1);
        assert!(after.find("x").is_none());
    }

    #[tokio::test]
    async fn test_live_mirror_follows_store_and_overrides_optimistic() {
        let store = MemoryStore::new();
        let columns = CollectionPath::new("users/u1/columns");
        let a = store
            .insert(&columns, Fields::new().set("title", "A").set("order", 0))
            .await
            .unwrap();
        let b = store
            .insert(&columns, Fields::new().set("title", "B").set("order", 1))
            .await
            .unwrap();

        let query = Query::all(columns.clone()).order_by("order", Direction::Ascending);
        let sub = store.subscribe(query).await.unwrap();
        let mirror = LiveMirror::spawn(sub, ColumnMirror, Vec::new());

        let view = mirror.wait_for_version(store.version() - 1).await;
        let titles: Vec<_> = view.items.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert!(view.is_loaded());

        // Optimistic swap is visible until the store pushes.
        let mut swapped = view.items.clone();
        swapped.reverse();
        mirror.apply_optimistic(swapped, view.version + 1);
        assert!(!mirror.current().confirmed);
        assert_eq!(mirror.items()[0].title, "B");

        // A push that does not include the swap wins.
        store
            .update(&columns.doc(&a), Fields::new().set("title", "A2"))
            .await
            .unwrap();
        let view = mirror.wait_for_version(store.version() - 1).await;
        let ids: Vec<_> = view.items.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![a.clone(), b.clone()]);
        assert_eq!(view.items[0].title, "A2");
        assert!(view.confirmed);
    }

    #[tokio::test]
    async fn test_dropping_mirror_unsubscribes() {
        let store = MemoryStore::new();
        let tasks = CollectionPath::new("users/u1/tasks");
        let sub = store.subscribe(Query::all(tasks.clone())).await.unwrap();
        let mirror = LiveMirror::spawn(sub, TaskMirror, TasksByColumn::default());
        mirror.wait_for_version(0).await;
        assert_eq!(store.subscriber_count(&tasks), 1);

        mirror.unsubscribe();
        // Abort is processed on the next scheduler turn.
        for _ in 0..10 {
            if store.subscriber_count(&tasks) == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.subscriber_count(&tasks), 0);
    }

    #[tokio::test]
    async fn test_mirror_skips_undecodable_docs() {
        let store = MemoryStore::new();
        let tasks = CollectionPath::new("users/u1/tasks");
        store
            .insert(&tasks, Fields::new().set("title", json!(["bad"])))
            .await
            .unwrap();
        store
            .insert(
                &tasks,
                Fields::new().set("title", "good").set("columnId", "A").set("order", 0),
            )
            .await
            .unwrap();
        let sub = store.subscribe(Query::all(tasks)).await.unwrap();
        let mirror = LiveMirror::spawn(sub, TaskMirror, TasksByColumn::default());
        let view = mirror.wait_for_version(store.version() - 1).await;
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items.column("A")[0].title, "good");
    }

    #[tokio::test]
    async fn test_optimistic_edit_after_write_settles_immediately() {
        let store = MemoryStore::new();
        let columns = CollectionPath::new("users/u1/columns");
        for (i, title) in ["A", "B", "C"].iter().enumerate() {
            store
                .insert(&columns, Fields::new().set("title", *title).set("order", i as i64))
                .await
                .unwrap();
        }
        let query = Query::all(columns.clone()).order_by("order", Direction::Ascending);
        let mirror = LiveMirror::spawn(store.subscribe(query).await.unwrap(), ColumnMirror, Vec::new());
        let before = mirror.wait_for_version(store.version() - 1).await;

        // Swap A and C on the server, then show the same swap locally once the
        // write has already been pushed.
        let mut swapped = before.items.clone();
        swapped.swap(0, 2);
        let batch = WriteBatch::new()
            .update(columns.doc(&swapped[0].id), Fields::new().set("order", 0))
            .update(columns.doc(&swapped[2].id), Fields::new().set("order", 2));
        store.commit(batch).await.unwrap();
        let landed = store.version() - 1;
        let confirmed = mirror.wait_for_version(landed).await;
        assert_eq!(titles(&confirmed), vec!["C", "B", "A"]);

        mirror.apply_optimistic(swapped, landed);
        let view = mirror.current();
        assert!(view.confirmed);
        assert_eq!(view.version, landed);
        assert_eq!(titles(&view), vec!["C", "B", "A"]);

        let settled = tokio::time::timeout(std::time::Duration::from_secs(1), mirror.wait_for_version(landed)).await;
        assert!(settled.is_ok());
    }

    #[tokio::test]
    async fn test_optimistic_edit_holds_until_its_version() {
        let (tx, mirror) = hand_fed_mirror(column_snapshot(1, &["A", "B"]));
        mirror.wait_for_version(1).await;

        mirror.apply_optimistic(column_snapshot(0, &["B", "A"]).decode_all(), 3);
        tx.send(column_snapshot(2, &["A", "B", "X"])).unwrap();
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        let held = mirror.current();
        assert!(!held.confirmed);
        assert_eq!(titles(&held), vec!["B", "A"]);

        tx.send(column_snapshot(3, &["B", "A"])).unwrap();
        let view = mirror.wait_for_version(3).await;
        assert_eq!(view.version, 3);
        assert_eq!(titles(&view), vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_closed_subscription_stops_mirror_and_keeps_last_view() {
        let (tx, mirror) = hand_fed_mirror(column_snapshot(1, &["A"]));
        tx.send(column_snapshot(2, &["A", "B"])).unwrap();
        mirror.wait_for_version(2).await;
        assert!(mirror.is_live());

        drop(tx);
        for _ in 0..50 {
            if !mirror.is_live() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!mirror.is_live());
        let view = mirror.current();
        assert!(view.confirmed);
        assert_eq!(view.version, 2);
        assert_eq!(titles(&view), vec!["A", "B"]);
    }
}
