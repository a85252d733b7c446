use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::ExecutionResult;

/// Events published while a batch runs.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentEvent {
    BatchStarted { proposed: usize },
    CapabilityUnavailable { reason: String },
    ActionSkipped { index: usize, action: String, reason: String },
    ActionStarted { index: usize, action: String },
    RetryScheduled { action: String, attempt: u32, max_retries: u32 },
    ActionSucceeded { index: usize, action: String },
    ActionFailed { index: usize, action: String },
    BatchFinished { result: ExecutionResult },
}

/// Handed explicitly to whoever emits events.
pub type EventSink = broadcast::Sender<AgentEvent>;

pub fn channel() -> (EventSink, broadcast::Receiver<AgentEvent>) {
    broadcast::channel(EVENT_CAPACITY)
}

/// Publishes an event. Having nobody listening is fine.
pub fn emit(events: &EventSink, event: AgentEvent) {
    let _ = events.send(event);
}

/// Subscribes to `events` and writes each one to the log until the sink is dropped.
pub fn spawn_reporter(events: &EventSink) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => report(&event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event reporter fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn report(event: &AgentEvent) {
    match event {
        AgentEvent::BatchStarted { proposed } => {
            info!(proposed, "Found {} action(s) to execute", proposed)
        }
        AgentEvent::CapabilityUnavailable { reason } => {
            warn!(%reason, "Input automation not available; cannot execute actions")
        }
        AgentEvent::ActionSkipped {
            index,
            action,
            reason,
        } => warn!(index, %action, %reason, "Skipping action"),
        AgentEvent::ActionStarted { index, action } => {
            info!(index, %action, "Processing action")
        }
        AgentEvent::RetryScheduled {
            action,
            attempt,
            max_retries,
        } => warn!(%action, attempt, max_retries, "Action failed, retrying"),
        AgentEvent::ActionSucceeded { index, action } => {
            debug!(index, %action, "Action completed successfully")
        }
        AgentEvent::ActionFailed { index, action } => {
            warn!(index, %action, "Action failed after all attempts")
        }
        AgentEvent::BatchFinished { result } => info!(
            succeeded = result.succeeded,
            executed = result.executed,
            validated = result.validated,
            proposed = result.proposed,
            "Action execution complete: {}/{} successful ({:.1}%)",
            result.succeeded,
            result.executed,
            result.success_rate()
        ),
    }
}

const EVENT_CAPACITY: usize = 64;
