//! Rows written by the worker and the SQL that writes them.
//!
//! Each insert runs in its own transaction. The two tables are written
//! independently, a quiz answer is never part of the raw event's commit.

pub mod learning_event;
pub mod quiz_answer;

pub use learning_event::InsertLearningEvent;
pub use quiz_answer::InsertQuizAnswer;
