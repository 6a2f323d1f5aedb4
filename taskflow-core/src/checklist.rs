/// Checklist edits. Every edit yields the full new list, which is persisted
/// as the task's `checklist` field.
use chrono::{DateTime, Utc};

use crate::types::{ChecklistItem, ValidationError};

/// Creation-time id (epoch millis), bumped until unique within the list.
pub fn new_item_id(existing: &[ChecklistItem], now: DateTime<Utc>) -> String {
    let mut candidate = now.timestamp_millis();
    loop {
        let id = candidate.to_string();
        if !existing.iter().any(|item| item.id == id) {
            return id;
        }
        candidate += 1;
    }
}

pub fn add_item(
    items: &[ChecklistItem],
    text: &str,
    now: DateTime<Utc>,
) -> Result<Vec<ChecklistItem>, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyChecklistItem);
    }
    let mut updated = items.to_vec();
    updated.push(ChecklistItem {
        id: new_item_id(items, now),
        text: text.to_string(),
        completed: false,
    });
    Ok(updated)
}

pub fn toggle_item(items: &[ChecklistItem], item_id: &str) -> Vec<ChecklistItem> {
    items
        .iter()
        .map(|item| {
            if item.id == item_id {
                ChecklistItem {
                    completed: !item.completed,
                    ..item.clone()
                }
            } else {
                item.clone()
            }
        })
        .collect()
}

pub fn remove_item(items: &[ChecklistItem], item_id: &str) -> Vec<ChecklistItem> {
    items.iter().filter(|item| item.id != item_id).cloned().collect()
}
