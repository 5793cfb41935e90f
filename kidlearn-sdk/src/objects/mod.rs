pub mod event;

pub use event::{LearningEvent, PayloadError, QuizAnswerPayload, event_types, parse_payload};
