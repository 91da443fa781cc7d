//! Question records and their store.

pub mod model;
pub mod storage;

pub use model::{Candidate, ProposedEdits, QuestionRow, ValidationContext, ValidationResult};
pub use storage::QuestionStore;
