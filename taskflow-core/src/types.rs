use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Columns seeded on first board load, in board order.
pub const TODO_COLUMN: &str = "To Do";
pub const IN_PROGRESS_COLUMN: &str = "In Progress";
pub const DONE_COLUMN: &str = "Done";
pub const DEFAULT_COLUMNS: [&str; 3] = [TODO_COLUMN, IN_PROGRESS_COLUMN, DONE_COLUMN];

/// Columns matched by title that can never be deleted.
pub fn is_protected_column(title: &str) -> bool {
    DEFAULT_COLUMNS.contains(&title)
}

/// Entities that share a dense `order` sequence within a scope.
/// Columns are ordered within a board, tasks within their column.
pub trait Ordered {
    fn id(&self) -> &str;
    fn order(&self) -> i64;
    fn set_order(&mut self, order: i64);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Column {
    pub fn is_protected(&self) -> bool {
        is_protected_column(&self.title)
    }
}

impl Ordered for Column {
    fn id(&self) -> &str {
        &self.id
    }

    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }
}

/// Find the first column whose title matches exactly.
pub fn find_column_by_title<'a>(columns: &'a [Column], title: &str) -> Option<&'a Column> {
    columns.iter().find(|c| c.title == title)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub column_id: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub order: i64,
    /// Accumulated tracked seconds, excluding a running interval.
    #[serde(default)]
    pub time_tracked: f64,
    #[serde(default)]
    pub is_tracking: bool,
    #[serde(default)]
    pub last_started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Ordered for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }
}

impl Task {
    /// True when the task sits in the column titled "Done".
    pub fn is_done(&self, columns: &[Column]) -> bool {
        find_column_by_title(columns, DONE_COLUMN).map_or(false, |c| c.id == self.column_id)
    }
}

/// The editable part of a task, as submitted from the task editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub column_id: String,
    pub priority: Priority,
    pub cover_image: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub checklist: Vec<ChecklistItem>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, column_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            column_id: column_id.into(),
            priority: Priority::default(),
            cover_image: None,
            due_date: None,
            checklist: Vec::new(),
        }
    }

    /// Draft prefilled from an existing task (editor opened on a card).
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            column_id: task.column_id.clone(),
            priority: task.priority,
            cover_image: task.cover_image.clone(),
            due_date: task.due_date,
            checklist: task.checklist.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTaskTitle);
        }
        Ok(())
    }
}

/// Author stamped onto comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default)]
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub author_email: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Input rejected locally, before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Task title cannot be empty")]
    EmptyTaskTitle,

    #[error("Column title cannot be empty")]
    EmptyColumnTitle,

    #[error("Checklist item cannot be empty")]
    EmptyChecklistItem,

    #[error("Comment cannot be empty")]
    EmptyComment,
}
