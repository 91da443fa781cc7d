//! Background task records and their store.

pub mod model;
pub mod storage;

pub use model::{GenerationCriteria, Progress, TaskKind, TaskRow, TaskStatus};
pub use storage::TaskStore;
