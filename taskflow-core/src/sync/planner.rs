/// Reorder planner for drag-and-drop within a single scope.
///
/// The dragged entity is removed from its index and spliced in at the target
/// index; every entity of the scope then gets its new array index as `order`.
/// The plan always covers the whole scope so the result is dense (0..n-1)
/// even when the previous orders had gaps.
use serde::{Deserialize, Serialize};

use crate::storage::{CollectionPath, Fields, WriteBatch};
use crate::types::Ordered;

/// Vertical bounds of a rendered element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementBounds {
    pub top: f64,
    pub height: f64,
}

impl ElementBounds {
    pub fn midpoint(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

/// Where a dragged entity lands in the target sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPosition {
    Index(usize),
    End,
}

/// Drop position from the pointer's vertical coordinate: the first element
/// whose midpoint lies below the pointer; append when there is none.
pub fn drop_position(pointer_y: f64, elements: &[ElementBounds]) -> DropPosition {
    elements
        .iter()
        .position(|el| pointer_y < el.midpoint())
        .map_or(DropPosition::End, DropPosition::Index)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub id: String,
    pub order: i64,
}

/// New total order for a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderPlan<T> {
    /// The scope in its new order, with `order` fields already re-derived.
    pub sequence: Vec<T>,
    /// One update per entity of the scope.
    pub updates: Vec<OrderUpdate>,
}

impl<T> ReorderPlan<T> {
    /// One batch updating `order` on every entity of the scope.
    pub fn to_batch(&self, collection: &CollectionPath) -> WriteBatch {
        self.updates.iter().fold(WriteBatch::new(), |batch, u| {
            batch.update(collection.doc(&u.id), Fields::new().set("order", u.order))
        })
    }
}

/// Plan moving `dragged_id` to `target` within `items`.
///
/// Returns `None` when the entity is not part of the scope or would land on
/// its own index (nothing to persist).
pub fn plan_reorder<T: Ordered + Clone>(
    items: &[T],
    dragged_id: &str,
    target: DropPosition,
) -> Option<ReorderPlan<T>> {
    let source = items.iter().position(|item| item.id() == dragged_id)?;

    let mut sequence = items.to_vec();
    let dragged = sequence.remove(source);
    let index = match target {
        DropPosition::Index(i) => i.min(sequence.len()),
        DropPosition::End => sequence.len(),
    };
    if index == source {
        return None;
    }
    sequence.insert(index, dragged);

    let updates = sequence
        .iter_mut()
        .enumerate()
        .map(|(i, item)| {
            item.set_order(i as i64);
            OrderUpdate {
                id: item.id().to_string(),
                order: i as i64,
            }
        })
        .collect();

    log::debug!(
        "[taskflow.planner] Moved {} from {} to {} in a scope of {}",
        dragged_id,
        source,
        index,
        items.len()
    );
    Some(ReorderPlan { sequence, updates })
}

/// Plan a column drag: the dragged column takes the index of the column it is
/// dragged over. Dragging a column over itself plans nothing.
pub fn plan_column_drag<T: Ordered + Clone>(
    items: &[T],
    dragged_id: &str,
    over_id: &str,
) -> Option<ReorderPlan<T>> {
    if dragged_id == over_id {
        return None;
    }
    let target = items.iter().position(|item| item.id() == over_id)?;
    plan_reorder(items, dragged_id, DropPosition::Index(target))
}
