/// Cross-scope mover: a task leaving its column for another one.
///
/// The task is appended to the destination (order = destination length) and
/// `columnId` plus `order` are written in one update. The source column is not
/// compacted; its next same-scope reorder re-densifies it.
use crate::storage::Fields;
use crate::types::{find_column_by_title, Column, Task, DONE_COLUMN};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub task_id: String,
    pub column_id: String,
    pub order: i64,
}

impl MovePlan {
    /// Both fields in a single update.
    pub fn to_fields(&self) -> Fields {
        Fields::new()
            .set("columnId", self.column_id.clone())
            .set("order", self.order)
    }

    /// The task as it looks once the move lands.
    pub fn apply_to(&self, task: &Task) -> Task {
        Task {
            column_id: self.column_id.clone(),
            order: self.order,
            ..task.clone()
        }
    }
}

/// Plan dropping `task` into another column holding `dest_tasks`.
/// Returns `None` when the destination is the task's own column.
pub fn plan_move(task: &Task, dest_column_id: &str, dest_tasks: &[Task]) -> Option<MovePlan> {
    if task.column_id == dest_column_id {
        return None;
    }
    let order = dest_tasks.iter().filter(|t| t.id != task.id).count() as i64;
    Some(MovePlan {
        task_id: task.id.clone(),
        column_id: dest_column_id.to_string(),
        order,
    })
}

/// Plan "mark complete": prepend the task to the Done column.
/// Returns `None` when the board has no Done column.
pub fn plan_mark_complete(task: &Task, columns: &[Column]) -> Option<MovePlan> {
    let done = find_column_by_title(columns, DONE_COLUMN)?;
    Some(MovePlan {
        task_id: task.id.clone(),
        column_id: done.id.clone(),
        order: 0,
    })
}
