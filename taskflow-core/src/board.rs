/// Per-user board client.
///
/// Combines a `RemoteStore` with the planner, mover, timer and checklist logic.
/// Every write goes to the store; local views only change through mirrored
/// snapshots (or an explicit optimistic replacement on the mirror).
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;

use crate::calendar;
use crate::checklist;
use crate::clock::Clock;
use crate::storage::{CollectionPath, Direction, Fields, Query, RemoteStore, StoreError, WriteBatch};
use crate::sync::mirror::{ColumnMirror, CommentMirror, LiveMirror, TaskMirror, TasksByColumn};
use crate::sync::mover::{plan_mark_complete, plan_move, MovePlan};
use crate::sync::planner::{plan_column_drag, plan_reorder, DropPosition, ReorderPlan};
use crate::timer::{self, TimerCommand};
use crate::types::*;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("The '{0}' column could not be found")]
    MissingColumn(String),

    #[error("Column '{0}' is protected and cannot be deleted")]
    ProtectedColumn(String),

    #[error("Could not save changes: {0}")]
    Store(#[from] StoreError),
}

/// How a failure reaches the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Shown inline; nothing was sent.
    Validation,
    /// A required column is missing; nothing was sent.
    MissingDependency,
    /// Refused by a protection rule; nothing was sent.
    Protected,
    /// The store rejected or could not perform the write.
    WriteFailure,
}

impl BoardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BoardError::Invalid(_) => ErrorKind::Validation,
            BoardError::MissingColumn(_) => ErrorKind::MissingDependency,
            BoardError::ProtectedColumn(_) => ErrorKind::Protected,
            BoardError::Store(_) => ErrorKind::WriteFailure,
        }
    }
}

/// Result of dropping a task onto a column.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    Reordered(ReorderPlan<Task>),
    Moved(MovePlan),
    Unchanged,
}

pub struct TaskBoard {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    user_id: String,
}

impl TaskBoard {
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn columns_path(&self) -> CollectionPath {
        CollectionPath::new(format!("users/{}/columns", self.user_id))
    }

    pub fn tasks_path(&self) -> CollectionPath {
        CollectionPath::new(format!("users/{}/tasks", self.user_id))
    }

    pub fn comments_path(&self, task_id: &str) -> CollectionPath {
        self.tasks_path().doc(task_id).collection("comments")
    }

    pub fn columns_query(&self) -> Query {
        Query::all(self.columns_path()).order_by("order", Direction::Ascending)
    }

    /// Tasks arrive unordered; the task mirror groups and sorts them.
    pub fn tasks_query(&self) -> Query {
        Query::all(self.tasks_path())
    }

    pub fn comments_query(&self, task_id: &str) -> Query {
        Query::all(self.comments_path(task_id)).order_by("createdAt", Direction::Descending)
    }

    fn seed_default_columns(&self, mut batch: WriteBatch) -> WriteBatch {
        let columns = self.columns_path();
        for (order, title) in DEFAULT_COLUMNS.iter().enumerate() {
            batch = batch.set(
                columns.new_doc(),
                Fields::new().set("title", *title).set("order", order as i64),
            );
        }
        batch
    }

    /// Seed the default columns when the user has none yet.
    /// Returns whether anything was written.
    pub async fn initialize(&self) -> Result<bool, BoardError> {
        let existing = self.store.get(&Query::all(self.columns_path())).await?;
        if !existing.is_empty() {
            return Ok(false);
        }
        self.store
            .commit(self.seed_default_columns(WriteBatch::new()))
            .await?;
        log::info!(
            "[taskflow.board.init] Seeded default columns for user {}",
            self.user_id
        );
        Ok(true)
    }

    pub async fn subscribe_columns(&self) -> Result<LiveMirror<Vec<Column>>, BoardError> {
        let sub = self.store.subscribe(self.columns_query()).await?;
        Ok(LiveMirror::spawn(sub, ColumnMirror, Vec::new()))
    }

    pub async fn subscribe_tasks(&self) -> Result<LiveMirror<TasksByColumn>, BoardError> {
        let sub = self.store.subscribe(self.tasks_query()).await?;
        Ok(LiveMirror::spawn(sub, TaskMirror, TasksByColumn::default()))
    }

    pub async fn subscribe_comments(&self, task_id: &str) -> Result<LiveMirror<Vec<Comment>>, BoardError> {
        let sub = self.store.subscribe(self.comments_query(task_id)).await?;
        Ok(LiveMirror::spawn(sub, CommentMirror, Vec::new()))
    }

    // --- Columns ---

    /// Append a column after the `existing` ones.
    pub async fn add_column(&self, title: &str, existing: &[Column]) -> Result<String, BoardError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyColumnTitle.into());
        }
        let fields = Fields::new()
            .set("title", title)
            .set("order", existing.len() as i64)
            .server_timestamp("createdAt");
        let id = self.store.insert(&self.columns_path(), fields).await?;
        log::info!("[taskflow.board.column] Added column {} ({})", title, id);
        Ok(id)
    }

    /// Delete a column together with its tasks, in one batch.
    pub async fn delete_column(&self, column: &Column, tasks: &[Task]) -> Result<(), BoardError> {
        if column.is_protected() {
            return Err(BoardError::ProtectedColumn(column.title.clone()));
        }
        let tasks_path = self.tasks_path();
        let batch = tasks
            .iter()
            .filter(|t| t.column_id == column.id)
            .fold(WriteBatch::new(), |batch, t| batch.delete(tasks_path.doc(&t.id)))
            .delete(self.columns_path().doc(&column.id));
        let removed = batch.len() - 1;
        self.store.commit(batch).await?;
        log::info!(
            "[taskflow.board.column] Deleted column {} and {} task(s)",
            column.title,
            removed
        );
        Ok(())
    }

    /// Column drag: `dragged_id` takes the slot of `over_id`.
    /// Returns the committed plan, or `None` when nothing changed.
    pub async fn reorder_columns(
        &self,
        columns: &[Column],
        dragged_id: &str,
        over_id: &str,
    ) -> Result<Option<ReorderPlan<Column>>, BoardError> {
        let Some(plan) = plan_column_drag(columns, dragged_id, over_id) else {
            return Ok(None);
        };
        self.commit_column_order(&plan).await?;
        Ok(Some(plan))
    }

    /// Persist a planned column order, for callers that show the plan first.
    pub async fn commit_column_order(&self, plan: &ReorderPlan<Column>) -> Result<(), BoardError> {
        self.store.commit(plan.to_batch(&self.columns_path())).await?;
        Ok(())
    }

    // --- Tasks ---

    fn require_column(columns: &[Column], column_id: &str) -> Result<(), BoardError> {
        if columns.iter().any(|c| c.id == column_id) {
            Ok(())
        } else {
            Err(BoardError::MissingColumn(column_id.to_string()))
        }
    }

    pub async fn add_task(&self, draft: &TaskDraft, columns: &[Column]) -> Result<String, BoardError> {
        draft.validate()?;
        Self::require_column(columns, &draft.column_id)?;
        let fields = Fields::from_serialize(draft)?
            .set("order", 0)
            .set("timeTracked", 0.0)
            .set("isTracking", false)
            .set("lastStarted", Value::Null)
            .server_timestamp("createdAt");
        let id = self.store.insert(&self.tasks_path(), fields).await?;
        log::debug!("[taskflow.board.task] Added task {} to column {}", id, draft.column_id);
        Ok(id)
    }

    pub async fn update_task(&self, task_id: &str, draft: &TaskDraft, columns: &[Column]) -> Result<(), BoardError> {
        draft.validate()?;
        Self::require_column(columns, &draft.column_id)?;
        let fields = Fields::from_serialize(draft)?;
        self.store.update(&self.tasks_path().doc(task_id), fields).await?;
        Ok(())
    }

    /// Editor submit: update an existing task or create a new one.
    pub async fn save_task(
        &self,
        existing: Option<&Task>,
        draft: &TaskDraft,
        columns: &[Column],
    ) -> Result<String, BoardError> {
        match existing.filter(|t| !t.id.is_empty()) {
            Some(task) => {
                self.update_task(&task.id, draft, columns).await?;
                Ok(task.id.clone())
            }
            None => self.add_task(draft, columns).await,
        }
    }

    /// Editor draft for a calendar day; the task lands in "To Do".
    pub fn new_task_for_day(&self, columns: &[Column], day: NaiveDate) -> Result<TaskDraft, BoardError> {
        calendar::draft_for_day(columns, day).ok_or_else(|| BoardError::MissingColumn(TODO_COLUMN.to_string()))
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), BoardError> {
        self.store.delete(&self.tasks_path().doc(task_id)).await?;
        log::debug!("[taskflow.board.task] Deleted task {}", task_id);
        Ok(())
    }

    /// Same-column drag: persist the whole column's new order in one batch.
    pub async fn reorder_tasks(
        &self,
        column_tasks: &[Task],
        dragged_id: &str,
        drop: DropPosition,
    ) -> Result<Option<ReorderPlan<Task>>, BoardError> {
        let Some(plan) = plan_reorder(column_tasks, dragged_id, drop) else {
            return Ok(None);
        };
        self.commit_task_order(&plan).await?;
        Ok(Some(plan))
    }

    /// Persist a planned order for one column's tasks.
    pub async fn commit_task_order(&self, plan: &ReorderPlan<Task>) -> Result<(), BoardError> {
        self.store.commit(plan.to_batch(&self.tasks_path())).await?;
        Ok(())
    }

    /// Cross-column drop: append to the destination, column and order in one update.
    pub async fn move_task(
        &self,
        task: &Task,
        dest_column_id: &str,
        dest_tasks: &[Task],
    ) -> Result<Option<MovePlan>, BoardError> {
        let Some(plan) = plan_move(task, dest_column_id, dest_tasks) else {
            return Ok(None);
        };
        self.store
            .update(&self.tasks_path().doc(&plan.task_id), plan.to_fields())
            .await?;
        log::debug!(
            "[taskflow.board.move] Moved task {} to column {} at {}",
            plan.task_id,
            plan.column_id,
            plan.order
        );
        Ok(Some(plan))
    }

    /// Dropping `dragged` onto a column: reorder within it, or move into it.
    pub async fn drop_task(
        &self,
        dragged: &Task,
        target_column_id: &str,
        target_tasks: &[Task],
        drop: DropPosition,
    ) -> Result<DropOutcome, BoardError> {
        let outcome = if dragged.column_id == target_column_id {
            self.reorder_tasks(target_tasks, &dragged.id, drop)
                .await?
                .map(DropOutcome::Reordered)
        } else {
            self.move_task(dragged, target_column_id, target_tasks)
                .await?
                .map(DropOutcome::Moved)
        };
        Ok(outcome.unwrap_or(DropOutcome::Unchanged))
    }

    /// Move the task to the top of the Done column.
    pub async fn mark_complete(&self, task: &Task, columns: &[Column]) -> Result<MovePlan, BoardError> {
        let plan = plan_mark_complete(task, columns)
            .ok_or_else(|| BoardError::MissingColumn(DONE_COLUMN.to_string()))?;
        self.store
            .update(&self.tasks_path().doc(&plan.task_id), plan.to_fields())
            .await?;
        Ok(plan)
    }

    // --- Timer ---

    async fn persist_timer(&self, task: &Task, command: TimerCommand) -> Result<(), BoardError> {
        self.store
            .update(&self.tasks_path().doc(&task.id), command.to_fields())
            .await?;
        log::debug!("[taskflow.timer] {:?} for task {}", command, task.id);
        Ok(())
    }

    /// Returns false when the timer was already running.
    pub async fn start_timer(&self, task: &Task) -> Result<bool, BoardError> {
        match timer::plan_start(task) {
            Some(command) => {
                self.persist_timer(task, command).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns the seconds added, or `None` when the timer was not running.
    pub async fn stop_timer(&self, task: &Task) -> Result<Option<f64>, BoardError> {
        match timer::plan_stop(task, self.clock.now()) {
            Some(command @ TimerCommand::Stop { elapsed }) => {
                self.persist_timer(task, command).await?;
                Ok(Some(elapsed))
            }
            _ => Ok(None),
        }
    }

    pub async fn toggle_timer(&self, task: &Task) -> Result<TimerCommand, BoardError> {
        let command = timer::plan_toggle(task, self.clock.now());
        self.persist_timer(task, command).await?;
        Ok(command)
    }

    // --- Checklist ---

    async fn write_checklist(&self, task: &Task, items: &[ChecklistItem]) -> Result<(), BoardError> {
        let fields = Fields::new().set("checklist", serde_json::to_value(items).map_err(StoreError::from)?);
        self.store.update(&self.tasks_path().doc(&task.id), fields).await?;
        Ok(())
    }

    pub async fn add_checklist_item(&self, task: &Task, text: &str) -> Result<Vec<ChecklistItem>, BoardError> {
        let items = checklist::add_item(&task.checklist, text, self.clock.now())?;
        self.write_checklist(task, &items).await?;
        Ok(items)
    }

    pub async fn toggle_checklist_item(&self, task: &Task, item_id: &str) -> Result<Vec<ChecklistItem>, BoardError> {
        let items = checklist::toggle_item(&task.checklist, item_id);
        self.write_checklist(task, &items).await?;
        Ok(items)
    }

    pub async fn remove_checklist_item(&self, task: &Task, item_id: &str) -> Result<Vec<ChecklistItem>, BoardError> {
        let items = checklist::remove_item(&task.checklist, item_id);
        self.write_checklist(task, &items).await?;
        Ok(items)
    }

    // --- Comments ---

    /// Append a comment; comments are never edited or removed.
    pub async fn add_comment(&self, task_id: &str, text: &str, author: &Author) -> Result<String, BoardError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyComment.into());
        }
        let fields = Fields::new()
            .set("text", text)
            .set("authorId", author.id.clone())
            .set("authorEmail", author.email.clone())
            .server_timestamp("createdAt");
        Ok(self.store.insert(&self.comments_path(task_id), fields).await?)
    }

    // --- Reset ---

    /// Delete every column and task and re-seed the default columns, in one batch.
    pub async fn reset_data(&self) -> Result<(), BoardError> {
        let columns = self.store.get(&Query::all(self.columns_path())).await?;
        let tasks = self.store.get(&Query::all(self.tasks_path())).await?;

        let columns_path = self.columns_path();
        let tasks_path = self.tasks_path();
        let mut batch = WriteBatch::new();
        for doc in &tasks.docs {
            batch = batch.delete(tasks_path.doc(&doc.id));
        }
        for doc in &columns.docs {
            batch = batch.delete(columns_path.doc(&doc.id));
        }
        let batch = self.seed_default_columns(batch);
        self.store.commit(batch).await?;
        log::info!(
            "[taskflow.board.reset] Reset data for user {}: removed {} column(s), {} task(s)",
            self.user_id,
            columns.len(),
            tasks.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::memory::MemoryStore;
    use crate::sync::planner::DropPosition;
    use chrono::{DateTime, TimeZone, Utc};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        board: TaskBoard,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let board = TaskBoard::new(store.clone(), clock.clone(), "u1");
        Fixture { store, clock, board }
    }

    async fn columns(f: &Fixture) -> Vec<Column> {
        f.store.get(&f.board.columns_query()).await.unwrap().decode_all()
    }

    async fn tasks(f: &Fixture) -> TasksByColumn {
        TasksByColumn::from_tasks(
            f.store
                .get(&f.board.tasks_query())
                .await
                .unwrap()
                .decode_all::<Task>(),
        )
    }

    async fn column_id(f: &Fixture, title: &str) -> String {
        columns(f)
            .await
            .into_iter()
            .find(|c| c.title == title)
            .map(|c| c.id)
            .unwrap()
    }

    async fn add(f: &Fixture, title: &str, column: &str) -> String {
        let cols = columns(f).await;
        f.board.add_task(&TaskDraft::new(title, column), &cols).await.unwrap()
    }

    #[tokio::test]
    async fn test_fresh_board_has_three_columns() {
        let f = fixture();
        assert!(f.board.initialize().await.unwrap());
        assert!(!f.board.initialize().await.unwrap());

        let cols = columns(&f).await;
        let summary: Vec<_> = cols.iter().map(|c| (c.title.as_str(), c.order)).collect();
        assert_eq!(summary, vec![("To Do", 0), ("In Progress", 1), ("Done", 2)]);
        assert!(tasks(&f).await.is_empty());
    }

    #[tokio::test]
    async fn test_add_column_appends() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let cols = columns(&f).await;
        f.board.add_column("  Backlog ", &cols).await.unwrap();

        let cols = columns(&f).await;
        assert_eq!(cols.len(), 4);
        assert_eq!(cols[3].title, "Backlog");
        assert_eq!(cols[3].order, 3);
        assert_eq!(cols[3].created_at, Some(t0()));

        let err = f.board.add_column("   ", &cols).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_delete_column_cascades_and_protects_defaults() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let cols = columns(&f).await;
        let extra = f.board.add_column("Later", &cols).await.unwrap();
        let todo = column_id(&f, "To Do").await;
        add(&f, "stays", &todo).await;
        add(&f, "goes", &extra).await;

        let cols = columns(&f).await;
        let later = cols.iter().find(|c| c.id == extra).unwrap().clone();
        let all: Vec<Task> = tasks(&f).await.all().cloned().collect();
        f.board.delete_column(&later, &all).await.unwrap();

        assert_eq!(columns(&f).await.len(), 3);
        let remaining = tasks(&f).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining.column(&todo)[0].title, "stays");

        let todo_col = cols.iter().find(|c| c.id == todo).unwrap();
        let err = f.board.delete_column(todo_col, &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protected);
        assert_eq!(columns(&f).await.len(), 3);
    }

    #[tokio::test]
    async fn test_add_task_defaults_and_validation() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let todo = column_id(&f, "To Do").await;
        let id = add(&f, "Write tests", &todo).await;

        let all = tasks(&f).await;
        let task = all.find(&id).unwrap();
        assert_eq!(task.order, 0);
        assert_eq!(task.time_tracked, 0.0);
        assert!(!task.is_tracking);
        assert!(task.last_started.is_none());
        assert_eq!(task.created_at, Some(t0()));
        assert_eq!(task.priority, Priority::Medium);

        let cols = columns(&f).await;
        let err = f.board.add_task(&TaskDraft::new(" ", &todo), &cols).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = f.board.add_task(&TaskDraft::new("x", "ghost"), &cols).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingDependency);
        assert_eq!(tasks(&f).await.len(), 1);
    }

    #[tokio::test]
    async fn test_save_task_updates_existing() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let todo = column_id(&f, "To Do").await;
        let id = add(&f, "Draft", &todo).await;
        let task = tasks(&f).await.find(&id).unwrap().clone();

        let mut draft = TaskDraft::from_task(&task);
        draft.title = "Final".into();
        draft.priority = Priority::High;
        draft.due_date = Some(t0());
        let cols = columns(&f).await;
        let saved = f.board.save_task(Some(&task), &draft, &cols).await.unwrap();
        assert_eq!(saved, id);

        let updated = tasks(&f).await.find(&id).unwrap().clone();
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.due_date, Some(t0()));
        assert_eq!(updated.created_at, task.created_at);
        assert_eq!(tasks(&f).await.len(), 1);
    }

    #[tokio::test]
    async fn test_reorder_within_column_is_dense() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let todo = column_id(&f, "To Do").await;
        for title in ["a", "b", "c"] {
            add(&f, title, &todo).await;
        }
        // New tasks all start at order 0; the first drag makes the column dense.
        let initial = tasks(&f).await.column(&todo).to_vec();
        let plan = f
            .board
            .reorder_tasks(&initial, &initial[0].id, DropPosition::End)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(plan.updates.len(), 3);
        let seeded = plan.sequence;

        let plan = f
            .board
            .reorder_tasks(&seeded, &seeded[2].id, DropPosition::Index(0))
            .await
            .unwrap()
            .unwrap();
        let expected: Vec<_> = [&seeded[2], &seeded[0], &seeded[1]]
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i as i64))
            .collect();
        let planned: Vec<_> = plan.sequence.iter().map(|t| (t.id.clone(), t.order)).collect();
        assert_eq!(planned, expected);

        let stored: Vec<_> = tasks(&f)
            .await
            .column(&todo)
            .iter()
            .map(|t| (t.id.clone(), t.order))
            .collect();
        assert_eq!(stored, expected);

        // Dropping a task on its own slot writes nothing.
        let version = f.store.version();
        let current = tasks(&f).await.column(&todo).to_vec();
        assert!(f
            .board
            .reorder_tasks(&current, &current[1].id, DropPosition::Index(1))
            .await
            .unwrap()
            .is_none());
        assert_eq!(f.store.version(), version);
    }

    #[tokio::test]
    async fn test_cross_column_drop_appends_and_leaves_gap() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let todo = column_id(&f, "To Do").await;
        let doing = column_id(&f, "In Progress").await;
        for title in ["a", "b", "c"] {
            add(&f, title, &todo).await;
        }
        let todo_tasks = tasks(&f).await.column(&todo).to_vec();
        let plan = f
            .board
            .reorder_tasks(&todo_tasks, &todo_tasks[0].id, DropPosition::End)
            .await
            .unwrap()
            .unwrap();
        let before: Vec<_> = plan.sequence.iter().map(|t| (t.id.clone(), t.order)).collect();

        add(&f, "x", &doing).await;
        let board = tasks(&f).await;
        let moving = board.column(&todo)[1].clone();
        let outcome = f
            .board
            .drop_task(&moving, &doing, board.column(&doing), DropPosition::Index(0))
            .await
            .unwrap();
        let plan = match outcome {
            DropOutcome::Moved(plan) => plan,
            other => panic!("expected a move, got {:?}", other),
        };
        assert_eq!(plan.order, 1);

        let board = tasks(&f).await;
        let moved = board.find(&moving.id).unwrap();
        assert_eq!(moved.column_id, doing);
        assert_eq!(moved.order, 1);

        let remaining: Vec<_> = board.column(&todo).iter().map(|t| (t.id.clone(), t.order)).collect();
        let expected: Vec<_> = before.into_iter().filter(|(id, _)| *id != moving.id).collect();
        assert_eq!(remaining, expected);
    }

    #[tokio::test]
    async fn test_mark_complete_needs_done_column() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let todo = column_id(&f, "To Do").await;
        let id = add(&f, "finish", &todo).await;
        let task = tasks(&f).await.find(&id).unwrap().clone();

        let cols = columns(&f).await;
        let plan = f.board.mark_complete(&task, &cols).await.unwrap();
        let done = tasks(&f).await.find(&id).unwrap().clone();
        assert_eq!(done.column_id, plan.column_id);
        assert_eq!(done.order, 0);
        assert!(done.is_done(&cols));

        let without_done: Vec<Column> = cols.into_iter().filter(|c| c.title != "Done").collect();
        let version = f.store.version();
        let err = f.board.mark_complete(&task, &without_done).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingDependency);
        assert_eq!(err.to_string(), "The 'Done' column could not be found");
        assert_eq!(f.store.version(), version);
    }

    #[tokio::test]
    async fn test_timer_round_trip() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let todo = column_id(&f, "To Do").await;
        let id = add(&f, "track", &todo).await;

        let task = tasks(&f).await.find(&id).unwrap().clone();
        assert!(f.board.start_timer(&task).await.unwrap());

        let running = tasks(&f).await.find(&id).unwrap().clone();
        assert!(running.is_tracking);
        assert_eq!(running.last_started, Some(t0()));

        // A second start leaves the recorded start alone.
        f.clock.advance(chrono::Duration::seconds(30));
        assert!(!f.board.start_timer(&running).await.unwrap());
        assert_eq!(tasks(&f).await.find(&id).unwrap().last_started, Some(t0()));

        f.clock.advance(chrono::Duration::milliseconds(15_250));
        let added = f.board.stop_timer(&running).await.unwrap();
        assert_eq!(added, Some(45.25));

        let stopped = tasks(&f).await.find(&id).unwrap().clone();
        assert!(!stopped.is_tracking);
        assert!(stopped.last_started.is_none());
        assert!((stopped.time_tracked - 45.25).abs() < 1e-9);
        assert_eq!(f.board.stop_timer(&stopped).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_checklist_edits_persist() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let todo = column_id(&f, "To Do").await;
        let id = add(&f, "list", &todo).await;

        let task = tasks(&f).await.find(&id).unwrap().clone();
        f.board.add_checklist_item(&task, "first").await.unwrap();
        let task = tasks(&f).await.find(&id).unwrap().clone();
        f.board.add_checklist_item(&task, "second").await.unwrap();
        let task = tasks(&f).await.find(&id).unwrap().clone();
        assert_eq!(task.checklist.len(), 2);
        assert_ne!(task.checklist[0].id, task.checklist[1].id);

        f.board.toggle_checklist_item(&task, &task.checklist[0].id).await.unwrap();
        let task = tasks(&f).await.find(&id).unwrap().clone();
        assert_eq!(task.checklist_ratio(), 0.5);

        f.board.remove_checklist_item(&task, &task.checklist[1].id).await.unwrap();
        let task = tasks(&f).await.find(&id).unwrap().clone();
        assert!(task.is_checklist_complete());

        let err = f.board.add_checklist_item(&task, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_comments_newest_first() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let todo = column_id(&f, "To Do").await;
        let id = add(&f, "discuss", &todo).await;
        let author = Author {
            id: "u1".into(),
            email: "u1@example.com".into(),
        };

        f.board.add_comment(&id, "first", &author).await.unwrap();
        f.clock.advance(chrono::Duration::seconds(1));
        f.board.add_comment(&id, "second", &author).await.unwrap();
        assert!(f.board.add_comment(&id, "  ", &author).await.is_err());

        let mirror = f.board.subscribe_comments(&id).await.unwrap();
        let view = mirror.wait_for_version(f.store.version() - 1).await;
        let texts: Vec<_> = view.items.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["second", "first"]);
        assert_eq!(view.items[0].author_email, "u1@example.com");
    }

    #[tokio::test]
    async fn test_reset_data_reseeds() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let cols = columns(&f).await;
        f.board.add_column("Extra", &cols).await.unwrap();
        let todo = column_id(&f, "To Do").await;
        add(&f, "gone", &todo).await;

        f.board.reset_data().await.unwrap();
        let cols = columns(&f).await;
        let titles: Vec<_> = cols.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["To Do", "In Progress", "Done"]);
        assert!(!cols.iter().any(|c| c.id == todo));
        assert!(tasks(&f).await.is_empty());
    }

    #[tokio::test]
    async fn test_new_task_for_day_needs_todo() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let cols = columns(&f).await;
        let day = NaiveDate::from_ymd_opt(2024, 2, 14).unwrap();
        let draft = f.board.new_task_for_day(&cols, day).unwrap();
        assert_eq!(draft.column_id, column_id(&f, "To Do").await);
        assert_eq!(draft.due_date.unwrap().date_naive(), day);

        let err = f.board.new_task_for_day(&cols[1..], day).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingDependency);
    }

    #[tokio::test]
    async fn test_write_failure_surfaces() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let cols = columns(&f).await;
        f.store.reject_writes(Some("offline"));
        let err = f.board.add_column("Later", &cols).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailure);
        f.store.reject_writes(None);
        assert_eq!(columns(&f).await.len(), 3);
    }

    #[tokio::test]
    async fn test_column_reorder_through_mirror() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let mirror = f.board.subscribe_columns().await.unwrap();
        let view = mirror.wait_for_version(f.store.version() - 1).await;
        let cols = view.items;

        let plan = f
            .board
            .reorder_columns(&cols, &cols[2].id, &cols[0].id)
            .await
            .unwrap()
            .unwrap();
        let planned: Vec<_> = plan.sequence.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(planned, vec!["Done", "To Do", "In Progress"]);

        let view = mirror.wait_for_version(f.store.version() - 1).await;
        let titles: Vec<_> = view.items.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Done", "To Do", "In Progress"]);
        let orders: Vec<_> = view.items.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);

        assert!(f
            .board
            .reorder_columns(&view.items, &view.items[1].id, &view.items[1].id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_task_order_shown_before_commit_is_confirmed() {
        let f = fixture();
        f.board.initialize().await.unwrap();
        let todo = column_id(&f, "To Do").await;
        for title in ["one", "two", "three"] {
            add(&f, title, &todo).await;
        }
        let mirror = f.board.subscribe_tasks().await.unwrap();
        let view = mirror.wait_for_version(f.store.version() - 1).await;

        let dragged = view.items.column(&todo)[2].id.clone();
        let plan = plan_reorder(view.items.column(&todo), &dragged, DropPosition::Index(0)).unwrap();
        let planned: Vec<_> = plan.sequence.iter().map(|t| t.id.clone()).collect();
        assert_eq!(planned[0], dragged);
        let mut shown = view.items.clone();
        shown.replace_column(&todo, plan.sequence.clone());
        mirror.apply_optimistic(shown, view.version + 1);
        assert!(!mirror.current().confirmed);

        f.board.commit_task_order(&plan).await.unwrap();
        let view = mirror.wait_for_version(f.store.version() - 1).await;
        let ids: Vec<_> = view.items.column(&todo).iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, planned);
        let orders: Vec<_> = view.items.column(&todo).iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert!(view.confirmed);
    }
}
