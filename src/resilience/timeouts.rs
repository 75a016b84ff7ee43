//! Timeout enforcement for provider calls.
//!
//! # Responsibilities
//! - Race a provider call against a deadline
//! - Report the loser's outcome as discarded, never cancelled
//!
//! # Design Decisions
//! - The call runs on its own task; on timeout the `JoinHandle` is dropped,
//!   which detaches the task instead of aborting it
//! - Timeout errors are distinct from network errors

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::client::types::{ClientError, ClientResult};
use crate::provider::types::ProviderError;

/// Run `call` on a spawned task and wait at most `deadline` for it.
pub async fn race_detached<T, F>(deadline: Duration, call: F) -> ClientResult<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(call);

    match timeout(deadline, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_error)) => {
            tracing::error!(error = %join_error, "Provider call task failed");
            Err(ClientError::Network {
                cause: Some(ProviderError::Internal(format!(
                    "provider call aborted: {}",
                    join_error
                ))),
            })
        }
        Err(_) => Err(ClientError::Timeout { after: deadline }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fast_call_wins() {
        let value = race_detached(Duration::from_millis(100), async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out_but_keeps_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let f = finished.clone();

        let err = race_detached(Duration::from_millis(100), async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            f.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(finished.load(Ordering::SeqCst), "detached call should complete");
    }

    #[tokio::test]
    async fn test_panicking_call_is_network_error() {
        let err = race_detached::<(), _>(Duration::from_secs(1), async {
            panic!("provider blew up")
        })
        .await
        .unwrap_err();
        assert!(err.is_network());
    }
}
