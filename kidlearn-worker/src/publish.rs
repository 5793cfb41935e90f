//! One-shot event publishing, for seeding and smoke-testing a deployment.

use kidlearn_core::transport::{EventPublisher, RedisPublisher};
use kidlearn_sdk::objects::{LearningEvent, QuizAnswerPayload, event_types, parse_payload};

/// A single event to publish, as given on the command line.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub event_type: String,
    /// JSON object text.
    pub payload: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl PublishRequest {
    /// Build the wire event, with a fresh id and the current time.
    pub fn build_event(&self) -> anyhow::Result<LearningEvent> {
        let payload = parse_payload(&self.payload)?;
        if self.event_type == event_types::QUIZ_ANSWER
            && !QuizAnswerPayload::has_required_keys(&payload)
        {
            tracing::warn!(
                required = ?QuizAnswerPayload::REQUIRED_KEYS,
                "quiz_answer payload is incomplete, no quiz answer row will be stored"
            );
        }

        let mut event = LearningEvent::new(self.event_type.clone(), payload);
        if let Some(user_id) = &self.user_id {
            event = event.with_user(user_id.clone());
        }
        if let Some(session_id) = &self.session_id {
            event = event.with_session(session_id.clone());
        }
        Ok(event)
    }
}

/// Publish one event on `channel`.
pub async fn publish_event(
    redis_url: &str,
    channel: &str,
    request: &PublishRequest,
) -> anyhow::Result<()> {
    let event = request.build_event()?;
    let message = event.to_message()?;

    let mut publisher = RedisPublisher::connect(redis_url).await?;
    let result = publisher.publish(channel, &message).await;
    publisher.close().await?;
    let receivers = result?;

    if receivers == 0 {
        tracing::warn!(channel = %channel, event_id = %event.id, "Event published but no subscriber received it");
    } else {
        tracing::info!(channel = %channel, event_id = %event.id, receivers, "Event published");
    }
    Ok(())
}
