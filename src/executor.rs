//! Replays one model response against the desktop.
//!
//! Actions run strictly one after another in the order the model emitted them,
//! since later ones usually depend on the effect of earlier ones (click, then
//! type). A bad action is skipped or counted as failed; it never stops the batch.

use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::brain::ContentBlock;
use crate::error::InjectionError;
use crate::events::{AgentEvent, EventSink, emit};
use crate::hands::{Hands, Pacing, perform};
use crate::types::{Action, COMPUTER_TOOL_NAME, DisplaySize, ExecutionResult, ProposedAction};
use crate::validate::validate_action;

/// How often a failed action is tried again, and how long to pause in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_millis(500),
        }
    }
}

pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Calls `attempt` until it succeeds, at most `max_retries + 1` times.
pub fn retry<F>(policy: &RetryPolicy, mut on_retry: impl FnMut(u32), mut attempt: F) -> bool
where
    F: FnMut() -> bool,
{
    for n in 0..=policy.max_retries {
        if attempt() {
            return true;
        }
        if n < policy.max_retries {
            on_retry(n + 1);
            if !policy.backoff.is_zero() {
                thread::sleep(policy.backoff);
            }
        }
    }
    false
}

/// Runs one validated action through its handler under the retry policy.
pub fn execute_with_retry<H: Hands + ?Sized>(
    action: &Action,
    hands: &mut H,
    pacing: &Pacing,
    policy: &RetryPolicy,
    events: &EventSink,
) -> bool {
    let kind = action.kind();
    debug!(action = %kind, max_retries = policy.max_retries, "Executing with retry");

    let succeeded = retry(
        policy,
        |attempt| {
            emit(
                events,
                AgentEvent::RetryScheduled {
                    action: kind.to_string(),
                    attempt,
                    max_retries: policy.max_retries,
                },
            )
        },
        || perform(action, hands, pacing),
    );

    if !succeeded {
        error!(action = %kind, attempts = policy.max_retries + 1, "Action failed after all attempts");
    }
    succeeded
}

/// Pulls every `computer` tool invocation out of a response, in order.
pub fn extract_proposed_actions(content: &[ContentBlock]) -> Vec<ProposedAction> {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { name, input, .. } if name == COMPUTER_TOOL_NAME => {
                Some(ProposedAction::from_input(input))
            }
            _ => None,
        })
        .collect()
}

/// Validates, dispatches and tallies one model response.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    display: DisplaySize,
    pacing: Pacing,
    retry: RetryPolicy,
    events: EventSink,
}

impl BatchExecutor {
    pub fn new(display: DisplaySize, events: EventSink) -> Self {
        Self {
            display,
            pacing: Pacing::default(),
            retry: RetryPolicy::default(),
            events,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn display(&self) -> DisplaySize {
        self.display
    }

    /// Acquires the input capability and replays the response's actions.
    ///
    /// Returns all-zero counts when the capability cannot be acquired.
    pub fn execute<H, F>(&self, acquire: F, content: &[ContentBlock]) -> ExecutionResult
    where
        H: Hands,
        F: FnOnce() -> Result<H, InjectionError>,
    {
        let mut hands = match acquire() {
            Ok(hands) => hands,
            Err(e) => {
                emit(
                    &self.events,
                    AgentEvent::CapabilityUnavailable {
                        reason: e.to_string(),
                    },
                );
                return ExecutionResult::default();
            }
        };
        self.execute_with(&mut hands, content)
    }

    /// Replays the response's actions on an already acquired capability.
    pub fn execute_with<H: Hands + ?Sized>(
        &self,
        hands: &mut H,
        content: &[ContentBlock],
    ) -> ExecutionResult {
        let proposed = extract_proposed_actions(content);
        let mut result = ExecutionResult {
            proposed: proposed.len(),
            ..Default::default()
        };

        if proposed.is_empty() {
            debug!("No computer actions found in the response");
            emit(&self.events, AgentEvent::BatchFinished { result });
            return result;
        }

        emit(
            &self.events,
            AgentEvent::BatchStarted {
                proposed: proposed.len(),
            },
        );
        debug!(display = %self.display, max_retries = self.retry.max_retries, "Starting batch");

        for (index, proposal) in proposed.iter().enumerate() {
            let index = index + 1;
            debug!(index, action = %proposal.name, params = ?proposal.parameters, "Proposed action");

            let kind = match proposal.kind() {
                Ok(kind) => kind,
                Err(rejection) => {
                    self.skip(index, &proposal.name, rejection.to_string());
                    continue;
                }
            };

            let Some(action) = validate_action(kind, &proposal.parameters, self.display) else {
                self.skip(index, &proposal.name, "parameter validation failed".to_string());
                continue;
            };
            result.validated += 1;

            emit(
                &self.events,
                AgentEvent::ActionStarted {
                    index,
                    action: kind.to_string(),
                },
            );
            result.executed += 1;

            if execute_with_retry(&action, hands, &self.pacing, &self.retry, &self.events) {
                result.succeeded += 1;
                emit(
                    &self.events,
                    AgentEvent::ActionSucceeded {
                        index,
                        action: kind.to_string(),
                    },
                );
            } else {
                emit(
                    &self.events,
                    AgentEvent::ActionFailed {
                        index,
                        action: kind.to_string(),
                    },
                );
            }
        }

        emit(&self.events, AgentEvent::BatchFinished { result });
        result
    }

    fn skip(&self, index: usize, action: &str, reason: String) {
        warn!(index, action, %reason, "Skipping proposed action");
        emit(
            &self.events,
            AgentEvent::ActionSkipped {
                index,
                action: action.to_string(),
                reason,
            },
        );
    }
}
