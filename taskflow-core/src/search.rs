use crate::sync::mirror::TasksByColumn;
use crate::types::Task;

/// Case-insensitive title match. An empty (or blank) query matches everything.
pub fn matches_title(task: &Task, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    query.is_empty() || task.title.to_lowercase().contains(&query)
}

/// Board filter: keeps the column grouping and in-column order, dropping
/// tasks whose title does not match.
pub fn filter_tasks(tasks: &TasksByColumn, query: &str) -> TasksByColumn {
    if query.trim().is_empty() {
        return tasks.clone();
    }
    let mut filtered = TasksByColumn::default();
    for (column_id, group) in tasks.groups() {
        let kept: Vec<Task> = group
            .iter()
            .filter(|t| matches_title(t, query))
            .cloned()
            .collect();
        filtered.replace_column(column_id, kept);
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, title: &str, column: &str, order: i64) -> Task {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": title,
            "columnId": column,
            "order": order,
        }))
        .unwrap()
    }

    fn board() -> TasksByColumn {
        TasksByColumn::from_tasks(vec![
            task("1", "Buy groceries", "A", 0),
            task("2", "Walk the dog", "A", 1),
            task("3", "GROCERY list", "B", 0),
        ])
    }

    #[test]
    fn test_filter_case_insensitive() {
        let filtered = filter_tasks(&board(), "grocer");
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.column("A")[0].id, "1");
        assert_eq!(filtered.column("B")[0].id, "3");
    }

    #[test]
    fn test_empty_query_returns_everything() {
        assert_eq!(filter_tasks(&board(), "").len(), 3);
        assert_eq!(filter_tasks(&board(), "   ").len(), 3);
    }

    #[test]
    fn test_no_match_keeps_empty_columns() {
        let filtered = filter_tasks(&board(), "nonexistent");
        assert!(filtered.is_empty());
        assert!(filtered.column("A").is_empty());
    }
}
