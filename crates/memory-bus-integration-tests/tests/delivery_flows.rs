//! Integration tests for the basic delivery flows
//!
//! These tests verify:
//! - Receiving from an empty queue without waiting
//! - Receive then complete
//! - Receive, abandon, receive again
//! - Concurrent acquisition of the next available session

mod common;

use common::{message, session_message, TestBus};
use memory_bus::{MessageStore, ReceiveMode};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Verify that an empty queue with no wait returns an empty batch at once
#[tokio::test(start_paused = true)]
async fn test_empty_queue_zero_wait_returns_empty() {
    let bus = TestBus::new();
    let queue = bus.queue("empty");
    let started = Instant::now();

    let received = queue
        .store()
        .as_plain()
        .unwrap()
        .receive(10, Duration::ZERO, ReceiveMode::PeekLock, &CancellationToken::new())
        .await
        .unwrap();

    assert!(received.is_empty());
    assert_eq!(started.elapsed(), Duration::ZERO);
}

/// Verify that completing the only message empties the queue
#[tokio::test]
async fn test_complete_empties_queue() {
    let bus = TestBus::new();
    let queue = bus.queue("orders");
    let store = queue.store().as_plain().unwrap();
    queue.add_message(message("m1")).unwrap();

    let received = store
        .receive(1, Duration::ZERO, ReceiveMode::PeekLock, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body.as_ref(), b"m1");
    assert!(received[0].locked_until().is_some());

    store
        .complete_message(received[0].lock_token().unwrap())
        .unwrap();

    assert_eq!(queue.message_count(), 0);
}

/// Verify that an abandoned message is received again
#[tokio::test]
async fn test_abandoned_message_is_received_again() {
    let bus = TestBus::new();
    let queue = bus.queue("orders");
    let store = queue.store().as_plain().unwrap();
    let cancellation = CancellationToken::new();
    queue.add_message(message("m2")).unwrap();

    let first = store
        .receive(1, Duration::ZERO, ReceiveMode::PeekLock, &cancellation)
        .await
        .unwrap();
    store
        .abandon_message(first[0].lock_token().unwrap())
        .unwrap();

    let second = store
        .receive(1, Duration::ZERO, ReceiveMode::PeekLock, &cancellation)
        .await
        .unwrap();

    assert_eq!(second.len(), 1);
    assert_eq!(second[0].body, first[0].body);
    assert_eq!(second[0].message_id, first[0].message_id);
    assert_eq!(second[0].delivery_count, 2);
}

/// Verify that concurrent acquirers get distinct sessions and a surplus acquirer times out
#[tokio::test(start_paused = true)]
async fn test_concurrent_acquirers_get_distinct_sessions() {
    let bus = TestBus::new();
    let queue = bus.session_queue("per-customer");
    queue.add_message(session_message("alice", "a1")).unwrap();
    queue.add_message(session_message("bob", "b1")).unwrap();

    let store = queue.store().as_sessions().unwrap();
    let cancellation = CancellationToken::new();
    let max_delay = Duration::from_secs(5);
    let started = Instant::now();

    let (first, second, third) = tokio::join!(
        store.try_acquire_next_available_session(max_delay, &cancellation),
        store.try_acquire_next_available_session(max_delay, &cancellation),
        store.try_acquire_next_available_session(max_delay, &cancellation),
    );

    let granted: Vec<_> = [first.unwrap(), second.unwrap(), third.unwrap()]
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(granted.len(), 2);

    let sessions: HashSet<_> = granted
        .iter()
        .map(|session| session.session_id().as_str().to_string())
        .collect();
    assert_eq!(
        sessions,
        HashSet::from(["alice".to_string(), "bob".to_string()])
    );

    assert!(started.elapsed() >= max_delay);
    assert_eq!(queue.store().active_message_count(), 2);
}
