//! Event processors.
//!
//! - `EventProcessor`: Receives a decoded event, validates and enriches it,
//!   stores the raw event and, for complete quiz answers, a quiz answer row
//! - `EventWorker`: Owns the subscription and feeds `EventProcessor` until
//!   shutdown or end of stream

pub mod event_processor;
pub mod worker;

pub use event_processor::{EventProcessor, ProcessError, ProcessOutcome};
pub use worker::{EventWorker, WorkerError, WorkerState, WorkerStats};
