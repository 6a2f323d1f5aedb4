/// User gestures on the board.
///
/// Every call site goes through here so failures are handled the same way:
/// validation errors come back inline, anything else is logged and shown as a
/// blocking alert. Destructive actions ask for confirmation first. Nothing is
/// retried.
use std::sync::Arc;

use chrono::NaiveDate;
use taskflow_core::board::{BoardError, DropOutcome, ErrorKind, TaskBoard};
use taskflow_core::sync::{
    plan_column_drag, plan_reorder, DropPosition, LiveMirror, MovePlan, ReorderPlan, TasksByColumn,
};
use taskflow_core::timer::TimerCommand;
use taskflow_core::types::{Author, ChecklistItem, Column, Task, TaskDraft, TODO_COLUMN};

pub const CONFIRM_DELETE_TASK: &str = "Delete this task?";
pub const CONFIRM_RESET: &str =
    "Are you sure you want to reset all your data? This will delete all columns and tasks and cannot be undone.";

pub fn confirm_delete_column(column: &Column) -> String {
    format!("Delete \"{}\" and all its tasks?", column.title)
}

/// Blocking user notifications.
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);
    /// True when the user accepts.
    fn confirm(&self, message: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureOutcome<T> {
    Done(T),
    /// Rejected locally; the message belongs next to the input.
    Invalid(String),
    /// Already alerted.
    Failed(String),
    /// The user declined the confirmation.
    Cancelled,
}

impl<T> GestureOutcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, GestureOutcome::Done(_))
    }

    pub fn done(self) -> Option<T> {
        match self {
            GestureOutcome::Done(value) => Some(value),
            _ => None,
        }
    }
}

pub struct Gestures {
    board: Arc<TaskBoard>,
    notifier: Arc<dyn Notifier>,
}

impl Gestures {
    pub fn new(board: Arc<TaskBoard>, notifier: Arc<dyn Notifier>) -> Self {
        Self { board, notifier }
    }

    pub fn board(&self) -> &TaskBoard {
        &self.board
    }

    fn settle<T>(&self, action: &str, result: Result<T, BoardError>) -> GestureOutcome<T> {
        let err = match result {
            Ok(value) => return GestureOutcome::Done(value),
            Err(err) => err,
        };
        match err.kind() {
            ErrorKind::Validation => GestureOutcome::Invalid(err.to_string()),
            ErrorKind::MissingDependency | ErrorKind::Protected => {
                log::warn!("[taskflow.gesture] {} refused: {}", action, err);
                let message = match &err {
                    BoardError::MissingColumn(title) if title == TODO_COLUMN => format!(
                        "Could not find the '{}' column. Please create one if it was deleted.",
                        TODO_COLUMN
                    ),
                    _ => format!("{}.", err),
                };
                self.notifier.alert(&message);
                GestureOutcome::Failed(message)
            }
            ErrorKind::WriteFailure => {
                log::error!("[taskflow.gesture] {} failed: {}", action, err);
                let message = format!("Error: Could not {}.", action);
                self.notifier.alert(&message);
                GestureOutcome::Failed(message)
            }
        }
    }

    pub async fn add_column(&self, title: &str, existing: &[Column]) -> GestureOutcome<String> {
        self.settle("add the new column", self.board.add_column(title, existing).await)
    }

    pub async fn delete_column(&self, column: &Column, tasks: &[Task]) -> GestureOutcome<()> {
        if column.is_protected() {
            return self.settle("delete the column", Err(BoardError::ProtectedColumn(column.title.clone())));
        }
        if !self.notifier.confirm(&confirm_delete_column(column)) {
            return GestureOutcome::Cancelled;
        }
        self.settle("delete the column", self.board.delete_column(column, tasks).await)
    }

    /// Column drag. The new order shows on `columns` before the write goes
    /// out; the next pushed snapshot replaces it, also after a failed write.
    pub async fn reorder_columns(
        &self,
        columns: &LiveMirror<Vec<Column>>,
        dragged_id: &str,
        over_id: &str,
    ) -> GestureOutcome<Option<ReorderPlan<Column>>> {
        let view = columns.current();
        let Some(plan) = plan_column_drag(&view.items, dragged_id, over_id) else {
            return GestureOutcome::Done(None);
        };
        columns.apply_optimistic(plan.sequence.clone(), view.version + 1);
        let result = self.board.commit_column_order(&plan).await;
        self.settle("reorder the columns", result.map(|()| Some(plan)))
    }

    /// Same-column task drag, shown on `tasks` before the write goes out.
    pub async fn reorder_tasks(
        &self,
        tasks: &LiveMirror<TasksByColumn>,
        column_id: &str,
        dragged_id: &str,
        drop: DropPosition,
    ) -> GestureOutcome<Option<ReorderPlan<Task>>> {
        let view = tasks.current();
        let Some(plan) = plan_reorder(view.items.column(column_id), dragged_id, drop) else {
            return GestureOutcome::Done(None);
        };
        let mut shown = view.items;
        shown.replace_column(column_id, plan.sequence.clone());
        tasks.apply_optimistic(shown, view.version + 1);
        let result = self.board.commit_task_order(&plan).await;
        self.settle("move the task", result.map(|()| Some(plan)))
    }

    pub async fn save_task(
        &self,
        existing: Option<&Task>,
        draft: &TaskDraft,
        columns: &[Column],
    ) -> GestureOutcome<String> {
        self.settle("save the task", self.board.save_task(existing, draft, columns).await)
    }

    pub fn new_task_for_day(&self, columns: &[Column], day: NaiveDate) -> GestureOutcome<TaskDraft> {
        self.settle("open a new task", self.board.new_task_for_day(columns, day))
    }

    pub async fn delete_task(&self, task_id: &str) -> GestureOutcome<()> {
        if !self.notifier.confirm(CONFIRM_DELETE_TASK) {
            return GestureOutcome::Cancelled;
        }
        self.settle("delete the task", self.board.delete_task(task_id).await)
    }

    pub async fn drop_task(
        &self,
        dragged: &Task,
        target_column_id: &str,
        target_tasks: &[Task],
        drop: DropPosition,
    ) -> GestureOutcome<DropOutcome> {
        self.settle(
            "move the task",
            self.board.drop_task(dragged, target_column_id, target_tasks, drop).await,
        )
    }

    pub async fn mark_complete(&self, task: &Task, columns: &[Column]) -> GestureOutcome<MovePlan> {
        self.settle("complete the task", self.board.mark_complete(task, columns).await)
    }

    pub async fn toggle_timer(&self, task: &Task) -> GestureOutcome<TimerCommand> {
        self.settle("update the timer", self.board.toggle_timer(task).await)
    }

    pub async fn add_checklist_item(&self, task: &Task, text: &str) -> GestureOutcome<Vec<ChecklistItem>> {
        self.settle("add the checklist item", self.board.add_checklist_item(task, text).await)
    }

    pub async fn toggle_checklist_item(&self, task: &Task, item_id: &str) -> GestureOutcome<Vec<ChecklistItem>> {
        self.settle(
            "update the checklist",
            self.board.toggle_checklist_item(task, item_id).await,
        )
    }

    pub async fn remove_checklist_item(&self, task: &Task, item_id: &str) -> GestureOutcome<Vec<ChecklistItem>> {
        self.settle(
            "update the checklist",
            self.board.remove_checklist_item(task, item_id).await,
        )
    }

    pub async fn add_comment(&self, task_id: &str, text: &str, author: &Author) -> GestureOutcome<String> {
        self.settle("post the comment", self.board.add_comment(task_id, text, author).await)
    }

    pub async fn reset_data(&self) -> GestureOutcome<()> {
        if !self.notifier.confirm(CONFIRM_RESET) {
            return GestureOutcome::Cancelled;
        }
        let outcome = self.settle(
            "reset your data. Please check the console for details",
            self.board.reset_data().await,
        );
        if outcome.is_done() {
            self.notifier.alert("Your data has been reset.");
        }
        outcome
    }
}
