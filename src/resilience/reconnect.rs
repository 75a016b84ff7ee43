//! Reconnection controller.
//!
//! # Responsibilities
//! - Compute the backoff delay for the next attempt
//! - Drive a reconnect action until it succeeds or the attempt budget is spent
//! - Let `reset()` cancel a scheduled attempt
//!
//! # Design Decisions
//! - An explicit loop, not self-recursion
//! - Only network-class failures consume attempts; anything else propagates
//! - The counter is 0 at rest: only an exhausted budget leaves it non-zero
//! - `reset()` starts a new epoch; a loop from an older epoch never touches the counter

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

use crate::client::types::{ClientError, ClientResult};
use crate::config::ReconnectionConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

#[derive(Debug, Default)]
struct Budget {
    /// Bumped by `reset()`.
    epoch: u64,
    attempts: u32,
}

/// Outcome of one connect call, decided under the budget lock.
enum Step {
    Done(ClientResult<()>),
    Retry,
}

/// Drives repeated connection attempts with exponential backoff.
#[derive(Debug)]
pub struct ReconnectionController {
    config: ReconnectionConfig,
    budget: Mutex<Budget>,
    cancel: Notify,
}

fn cancelled() -> ClientError {
    ClientError::Connection {
        reason: "reconnection cancelled by reset".to_string(),
    }
}

impl ReconnectionController {
    pub fn new(config: ReconnectionConfig) -> Self {
        Self {
            config,
            budget: Mutex::new(Budget::default()),
            cancel: Notify::new(),
        }
    }

    fn budget(&self) -> MutexGuard<'_, Budget> {
        self.budget.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Failed attempts in the current run, or the final count of an exhausted one.
    pub fn attempts(&self) -> u32 {
        self.budget().attempts
    }

    pub fn config(&self) -> &ReconnectionConfig {
        &self.config
    }

    /// Delay that precedes attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.config.base_delay_ms,
            self.config.max_delay_ms,
            self.config.backoff_multiplier,
            self.config.jitter,
        )
    }

    /// Clear the counter and cancel any running attempt loop.
    ///
    /// A loop waiting on its delay returns at once. A loop inside its
    /// connect action returns when the action does, without counting it.
    pub fn reset(&self) {
        {
            let mut budget = self.budget();
            budget.epoch += 1;
            budget.attempts = 0;
        }
        self.cancel.notify_waiters();
    }

    /// Run `connect` until it succeeds.
    ///
    /// Each attempt waits for its backoff delay first. A `Network` failure
    /// counts against the budget; once `max_attempts` failures accumulate the
    /// call fails with [`ClientError::Reconnection`] and the counter keeps
    /// that value. Any other error is returned as-is and clears the counter.
    pub async fn attempt_reconnection<F, Fut>(&self, mut connect: F) -> ClientResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<()>>,
    {
        let max_attempts = self.config.max_attempts;
        let epoch = self.budget().epoch;

        loop {
            // Registered before the epoch check so a concurrent reset is never missed.
            let cancel = self.cancel.notified();
            tokio::pin!(cancel);

            let attempt = {
                let budget = self.budget();
                if budget.epoch != epoch {
                    return Err(cancelled());
                }
                budget.attempts
            };
            if attempt >= max_attempts {
                return Err(ClientError::Reconnection { attempts: attempt });
            }

            let delay = self.delay_for(attempt);
            tracing::info!(
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnection attempt"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut cancel => {
                    tracing::info!("Pending reconnection attempt cancelled");
                    return Err(cancelled());
                }
            }

            metrics::record_reconnect_attempt();
            let outcome = connect().await;

            let step = {
                let mut budget = self.budget();
                if budget.epoch != epoch {
                    tracing::info!("Reconnection attempt finished after reset, discarding outcome");
                    Step::Done(Err(cancelled()))
                } else {
                    match outcome {
                        Ok(()) => {
                            budget.attempts = 0;
                            tracing::info!(attempt = attempt + 1, "Reconnected");
                            Step::Done(Ok(()))
                        }
                        Err(e) if e.is_network() => {
                            budget.attempts += 1;
                            let made = budget.attempts;
                            tracing::warn!(
                                attempt = made,
                                max_attempts,
                                error = %e,
                                "Reconnection attempt failed"
                            );
                            if made >= max_attempts {
                                Step::Done(Err(ClientError::Reconnection { attempts: made }))
                            } else {
                                Step::Retry
                            }
                        }
                        Err(e) => {
                            budget.attempts = 0;
                            tracing::warn!(error = %e, "Reconnection aborted by non-network error");
                            Step::Done(Err(e))
                        }
                    }
                }
            };

            if let Step::Done(result) = step {
                return result;
            }
        }
    }
}
