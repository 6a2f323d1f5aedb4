//! Ordered collection sync: local mirrors of remote scopes, the reorder
//! planner and the cross-scope mover.
pub mod mirror;
pub mod mover;
pub mod planner;

pub use mirror::{ColumnMirror, CommentMirror, LiveMirror, MirrorView, SnapshotReducer, TaskMirror, TasksByColumn};
pub use mover::{plan_mark_complete, plan_move, MovePlan};
pub use planner::{drop_position, plan_column_drag, plan_reorder, DropPosition, ElementBounds, OrderUpdate, ReorderPlan};
