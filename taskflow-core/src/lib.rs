pub mod board;
pub mod calendar;
pub mod checklist;
pub mod clock;
pub mod progress;
pub mod search;
pub mod storage;
pub mod sync;
pub mod timer;
pub mod types;

pub use board::{BoardError, DropOutcome, ErrorKind, TaskBoard};
pub use clock::{Clock, ManualClock, SystemClock};
pub use storage::{RemoteStore, StoreError};
