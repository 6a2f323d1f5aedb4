/// Derived projections recomputed on every render; none of them are persisted.
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{ChecklistItem, Task};

const MS_PER_HOUR: f64 = 60.0 * 60.0 * 1000.0;
const MS_PER_DAY: f64 = 24.0 * MS_PER_HOUR;

/// Completed / total, or 0 for an empty checklist.
pub fn checklist_ratio(items: &[ChecklistItem]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let completed = items.iter().filter(|i| i.completed).count();
    completed as f64 / items.len() as f64
}

pub fn checklist_percent(items: &[ChecklistItem]) -> f64 {
    checklist_ratio(items) * 100.0
}

/// At least one item, all of them completed.
pub fn is_checklist_complete(items: &[ChecklistItem]) -> bool {
    !items.is_empty() && items.iter().all(|i| i.completed)
}

/// Badge text for a due date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainingTime {
    pub text: String,
    pub is_past: bool,
}

/// Past due → "Overdue"; within 24 hours → "{h}h {m}m left";
/// otherwise whole days rounded up → "{d} days left".
pub fn remaining_time(now: DateTime<Utc>, due: DateTime<Utc>) -> RemainingTime {
    let diff_ms = (due - now).num_milliseconds();
    if diff_ms < 0 {
        return RemainingTime {
            text: "Overdue".to_string(),
            is_past: true,
        };
    }
    let hours_total = diff_ms as f64 / MS_PER_HOUR;
    if hours_total < 24.0 {
        let hours = hours_total.floor();
        let minutes = ((hours_total - hours) * 60.0).floor();
        return RemainingTime {
            text: format!("{}h {}m left", hours as i64, minutes as i64),
            is_past: false,
        };
    }
    let days = (diff_ms as f64 / MS_PER_DAY).ceil() as i64;
    RemainingTime {
        text: format!("{} days left", days),
        is_past: false,
    }
}

impl Task {
    pub fn remaining_time(&self, now: DateTime<Utc>) -> Option<RemainingTime> {
        self.due_date.map(|due| remaining_time(now, due))
    }

    pub fn checklist_ratio(&self) -> f64 {
        checklist_ratio(&self.checklist)
    }

    pub fn is_checklist_complete(&self) -> bool {
        is_checklist_complete(&self.checklist)
    }
}
