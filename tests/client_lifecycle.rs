//! Lifecycle tests for the beacon client.

use std::collections::HashSet;
use std::time::Duration;

use beacon_client::provider::{MockBehavior, SubscribeFailure};
use beacon_client::{LifecycleState, RequestId};

mod common;

#[tokio::test]
async fn test_initialize_subscribes_and_becomes_ready() {
    let provider = common::mock(MockBehavior::default());
    let client = common::client(common::fast_config(1_000, 3), &provider);
    assert_eq!(client.state(), LifecycleState::Uninitialized);

    client.initialize().await.unwrap();

    assert!(client.is_ready());
    assert_eq!(provider.subscribe_calls(), 1);
    assert_eq!(provider.active_subscriptions(), 1);
    assert!(client.active_subscription().is_some());
}

#[tokio::test]
async fn test_initialize_twice_is_a_no_op() {
    let provider = common::mock(MockBehavior::default());
    let client = common::ready_client(&provider).await;

    client.initialize().await.unwrap();
    assert_eq!(provider.subscribe_calls(), 1);
}

#[tokio::test]
async fn test_request_before_initialize_fails_with_connection_error() {
    let provider = common::mock(MockBehavior::default());
    let client = common::client(common::fast_config(1_000, 3), &provider);

    let err = client.request_randomness(|_| Ok(())).await.unwrap_err();
    assert!(err.is_connection(), "unexpected error: {err}");

    let err = client.get_randomness_by_round_id(1).await.unwrap_err();
    assert!(err.is_connection(), "unexpected error: {err}");

    assert_eq!(provider.submit_calls(), 0);
    assert_eq!(provider.query_calls(), 0);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_request_ids_unique_and_prefixed() {
    let provider = common::mock(MockBehavior::default());
    let client = common::ready_client(&provider).await;

    let mut ids: HashSet<RequestId> = HashSet::new();
    for _ in 0..50 {
        let id = client.request_randomness(|_| Ok(())).await.unwrap();
        assert!(id.as_str().starts_with("req_"), "bad prefix: {id}");
        assert!(ids.insert(id));
    }
    assert_eq!(client.pending_requests(), 50);
}

#[tokio::test]
async fn test_cleanup_twice_does_not_raise() {
    let provider = common::mock(MockBehavior::default());
    let client = common::ready_client(&provider).await;
    client.request_randomness(|_| Ok(())).await.unwrap();

    client.cleanup().await;
    client.cleanup().await;

    assert_eq!(client.state(), LifecycleState::Uninitialized);
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(provider.active_subscriptions(), 0);
    assert_eq!(provider.unsubscribe_calls(), 1);
}

#[tokio::test]
async fn test_cleanup_without_initialize() {
    let provider = common::mock(MockBehavior::default());
    let client = common::client(common::fast_config(1_000, 3), &provider);

    client.cleanup().await;

    assert_eq!(client.state(), LifecycleState::Uninitialized);
    assert_eq!(provider.unsubscribe_calls(), 0);
}

#[tokio::test]
async fn test_reinitialize_after_cleanup() {
    let provider = common::mock(MockBehavior::default());
    let client = common::ready_client(&provider).await;

    client.cleanup().await;
    let err = client.request_randomness(|_| Ok(())).await.unwrap_err();
    assert!(err.is_connection());

    client.initialize().await.unwrap();
    assert!(client.is_ready());
    assert_eq!(provider.active_subscriptions(), 1);
    client.request_randomness(|_| Ok(())).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_initialize_retries_transient_subscribe_failures() {
    let provider = common::mock(MockBehavior {
        subscribe_failure: SubscribeFailure::Times(2),
        ..MockBehavior::default()
    });
    let client = common::client(common::fast_config(1_000, 3), &provider);

    let started = tokio::time::Instant::now();
    client.initialize().await.unwrap();

    // 1s then 2s of subscribe backoff.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(3_000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(3_100), "elapsed {elapsed:?}");
    assert_eq!(provider.subscribe_calls(), 3);
    assert_eq!(client.reconnect_attempts(), 0);
    assert!(client.is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_initialize_hands_off_to_reconnection() {
    // Exhausts the three in-initialize subscribe attempts, then one more
    // succeeds inside the first reconnection attempt.
    let provider = common::mock(MockBehavior {
        subscribe_failure: SubscribeFailure::Times(3),
        ..MockBehavior::default()
    });
    let client = common::client(common::fast_config(1_000, 3), &provider);

    client.initialize().await.unwrap();

    assert!(client.is_ready());
    assert_eq!(provider.subscribe_calls(), 4);
    assert_eq!(provider.active_subscriptions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_subscription_surfaces_immediately() {
    let provider = common::mock(MockBehavior {
        subscribe_failure: SubscribeFailure::Rejected,
        ..MockBehavior::default()
    });
    let client = common::client(common::fast_config(1_000, 3), &provider);

    let err = client.initialize().await.unwrap_err();

    assert!(err.is_subscription(), "unexpected error: {err}");
    assert_eq!(provider.subscribe_calls(), 1);
    assert_eq!(client.reconnect_attempts(), 0);
    assert_eq!(client.state(), LifecycleState::Uninitialized);

    // Not terminal: a later initialize may succeed.
    provider.configure(|b| b.subscribe_failure = SubscribeFailure::Never);
    client.initialize().await.unwrap();
    assert!(client.is_ready());
}

#[tokio::test]
async fn test_query_returns_published_round() {
    let provider = common::mock(MockBehavior::default());
    let client = common::ready_client(&provider).await;

    let event = provider.publish_round();
    let found = client
        .get_randomness_by_round_id(event.round_id)
        .await
        .unwrap()
        .expect("round should exist");

    assert_eq!(found.round_id, event.round_id);
    assert_eq!(found.random_number, format!("0x{}", hex::encode(event.random_number)));
    assert_eq!(found.nonce.len(), 2 + 32);
    assert_eq!(found.random_number.len(), 2 + 64);
}

#[tokio::test]
async fn test_query_unknown_round_returns_none() {
    let provider = common::mock(MockBehavior::default());
    let client = common::ready_client(&provider).await;

    assert!(client.get_randomness_by_round_id(9_999).await.unwrap().is_none());
    assert_eq!(provider.query_calls(), 1);
}

#[tokio::test]
async fn test_provider_passthroughs() {
    let provider = common::mock(MockBehavior::default());
    let client = common::client(common::fast_config(1_000, 3), &provider);

    assert_eq!(client.chain_id().await.unwrap().to_string(), "mock-chain");
    assert_eq!(client.account().await.unwrap().owner, "mock-owner");
}

#[tokio::test(start_paused = true)]
async fn test_wait_ready_wakes_on_transition() {
    let provider = common::mock(MockBehavior {
        subscribe_failure: SubscribeFailure::Times(3),
        ..MockBehavior::default()
    });
    let client = common::client(common::fast_config(1_000, 3), &provider);

    let init = {
        let client = client.clone();
        tokio::spawn(async move { client.initialize().await })
    };

    assert!(client.wait_ready(Duration::from_secs(10)).await);
    init.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_wait_ready_returns_false_on_failure() {
    let provider = common::mock(MockBehavior {
        subscribe_failure: SubscribeFailure::Always,
        ..MockBehavior::default()
    });
    let client = common::client(common::fast_config(1_000, 1), &provider);

    let init = {
        let client = client.clone();
        tokio::spawn(async move { client.initialize().await })
    };

    assert!(!client.wait_ready(Duration::from_secs(60)).await);
    assert_eq!(client.state(), LifecycleState::Failed);
    assert!(init.await.unwrap().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cleanup_racing_requests_leaves_no_callbacks() {
    for _ in 0..20 {
        let provider = common::mock(MockBehavior::default());
        let client = common::ready_client(&provider).await;

        let requests: Vec<_> = (0..16)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.request_randomness(|_| Ok(())).await })
            })
            .collect();
        client.cleanup().await;

        for request in requests {
            let _ = request.await.unwrap();
        }
        assert_eq!(client.pending_requests(), 0);
    }
}
