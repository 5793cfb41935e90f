//! EventWorker runtime.
//!
//! The EventWorker is responsible for:
//! - Subscribing to the learning-events channel
//! - Feeding each decoded event to the [`EventProcessor`], one at a time
//! - Logging per-event failures without stopping
//! - Stopping on the shutdown signal or when the stream ends
//! - Releasing the subscription, then the store
//!
//! The shutdown signal is only observed between events. An event that has
//! been received is always processed to completion.

use super::event_processor::{EventProcessor, ProcessOutcome};
use crate::events::event_type_of;
use crate::store::EventStore;
use crate::transport::{EventSubscriber, TransportError};
use kanau::processor::Processor;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Errors that stop the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The channel could not be subscribed to at startup.
    #[error("failed to subscribe to channel {channel}: {source}")]
    Subscribe {
        channel: String,
        #[source]
        source: TransportError,
    },
}

/// Lifecycle of a worker, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Listening,
    Draining,
    Stopped,
}

/// Counters for one worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Decoded events handed to the processor.
    pub received: u64,
    /// Raw events stored.
    pub stored: u64,
    /// Quiz answers stored.
    pub quiz_answers: u64,
    /// Events dropped by validation.
    pub rejected: u64,
    /// Events whose processing failed in the store.
    pub failed: u64,
}

/// Drives a subscriber and a processor until shutdown.
pub struct EventWorker<Sub, S> {
    subscriber: Sub,
    processor: EventProcessor<S>,
    channel: String,
    shutdown_rx: watch::Receiver<bool>,
    state: WorkerState,
}

impl<Sub, S> EventWorker<Sub, S>
where
    Sub: EventSubscriber,
    S: EventStore,
{
    /// Create a new EventWorker.
    ///
    /// # Arguments
    ///
    /// * `subscriber` - Transport to receive events from, not yet subscribed
    /// * `processor` - Processor wrapping the event store
    /// * `channel` - Channel name to subscribe to
    /// * `shutdown_rx` - Receiver for shutdown signal; a dropped sender
    ///   counts as shutdown
    pub fn new(
        subscriber: Sub,
        processor: EventProcessor<S>,
        channel: impl Into<String>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            subscriber,
            processor,
            channel: channel.into(),
            shutdown_rx,
            state: WorkerState::Starting,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run the worker until shutdown or end of stream.
    ///
    /// Only a failed subscription is an error. Resources are released on
    /// every path, subscriber first.
    pub async fn run(&mut self) -> Result<WorkerStats, WorkerError> {
        info!(channel = %self.channel, "EventWorker starting");

        if let Err(source) = self.subscriber.subscribe(&self.channel).await {
            error!(channel = %self.channel, error = %source, "Failed to subscribe");
            self.release().await;
            return Err(WorkerError::Subscribe {
                channel: self.channel.clone(),
                source,
            });
        }

        self.transition(WorkerState::Listening);
        info!(channel = %self.channel, "EventWorker listening");
        let stats = self.listen().await;

        self.transition(WorkerState::Draining);
        self.release().await;

        info!(
            received = stats.received,
            stored = stats.stored,
            quiz_answers = stats.quiz_answers,
            rejected = stats.rejected,
            failed = stats.failed,
            "EventWorker stopped"
        );
        Ok(stats)
    }

    async fn listen(&mut self) -> WorkerStats {
        let mut stats = WorkerStats::default();

        loop {
            if *self.shutdown_rx.borrow() {
                info!("EventWorker received shutdown signal");
                break;
            }

            let next = tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown sender dropped, stopping EventWorker");
                        break;
                    }
                    continue;
                }

                event = self.subscriber.next_event() => event,
            };

            let Some(event) = next else {
                warn!(channel = %self.channel, "Subscription stream ended");
                break;
            };

            stats.received += 1;
            let event_type = event_type_of(&event).to_owned();
            debug!(event_type = %event_type, "Received event");

            match self.processor.process(event).await {
                Ok(ProcessOutcome::Stored { quiz_answer_id, .. }) => {
                    stats.stored += 1;
                    if quiz_answer_id.is_some() {
                        stats.quiz_answers += 1;
                    }
                }
                Ok(ProcessOutcome::Rejected(_)) => stats.rejected += 1,
                Err(e) => {
                    stats.failed += 1;
                    error!(event_type = %event_type, error = %e, "Failed to process event");
                }
            }
        }

        stats
    }

    /// Close the subscriber, then the store. The store is closed even if
    /// the subscriber fails to.
    async fn release(&mut self) {
        if let Err(e) = self.subscriber.close().await {
            error!(error = %e, "Failed to close subscriber");
        }
        self.processor.store().close().await;
        self.transition(WorkerState::Stopped);
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(from = ?self.state, to = ?next, "EventWorker state change");
        self.state = next;
    }
}
