//! Tests for locked session handles.

use super::*;
use crate::clock::{ManualClock, SharedClock};
use crate::message::Message;
use tokio::sync::Notify;

fn locked(clock: &ManualClock, bodies: &[&'static str]) -> LockedSession {
    let session_id = SessionId::new("customer-7").unwrap();
    let clock: SharedClock = Arc::new(clock.clone());
    let engine = Arc::new(SessionEngine::new(
        session_id.clone(),
        "ns/queue",
        Duration::from_secs(10),
        clock,
        Arc::new(Notify::new()),
    ));
    for body in bodies {
        engine
            .add_message(Message::new(*body).with_session_id(session_id.clone()))
            .unwrap();
    }
    engine.try_lock_if_not_empty().unwrap()
}

/// Verify that the handle exposes the session identity and lease.
#[test]
fn test_handle_accessors() {
    let clock = ManualClock::starting_now();
    let session = locked(&clock, &["a"]);

    assert_eq!(session.session_id().as_str(), "customer-7");
    assert!(session.is_held());
    assert_eq!(
        session.locked_until(),
        session.engine().locked_until()
    );
}

/// Verify that clones share one lock grant.
#[test]
fn test_clones_share_lock() {
    let clock = ManualClock::starting_now();
    let session = locked(&clock, &["a"]);
    let clone = session.clone();

    assert_eq!(session.lock_token(), clone.lock_token());

    clone.release();

    assert!(!session.is_held());
    assert_eq!(
        session.renew_session_lock(),
        Err(LockFailure::SessionLockLost)
    );
}

/// Verify that the handle loses the lease once the clock passes its expiry.
#[test]
fn test_handle_expires_with_clock() {
    let clock = ManualClock::starting_now();
    let session = locked(&clock, &["a"]);

    clock.advance(Duration::from_secs(11));

    assert!(!session.is_held());
    assert_eq!(session.locked_until(), None);
    assert_eq!(
        session.get_session_state().map(|_| ()),
        Err(LockFailure::SessionLockLost)
    );
}

/// Verify the delegating operations end to end.
#[tokio::test]
async fn test_delegating_operations() {
    let clock = ManualClock::starting_now();
    let session = locked(&clock, &["a", "b"]);
    let cancellation = CancellationToken::new();

    let batch = session
        .receive(2, Duration::ZERO, ReceiveMode::PeekLock, &cancellation)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.len(), 2);

    session
        .renew_message_lock(batch[0].lock_token().unwrap())
        .unwrap();
    session
        .abandon_message(batch[0].lock_token().unwrap())
        .unwrap();
    session
        .complete_message(batch[1].lock_token().unwrap())
        .unwrap();

    session.set_session_state("cursor=1").unwrap();
    assert_eq!(session.get_session_state().unwrap(), Bytes::from("cursor=1"));

    let again = session
        .receive(2, Duration::ZERO, ReceiveMode::PeekLock, &cancellation)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].body, Bytes::from("a"));
}

/// Verify that a lost lock is reported inside the outer result.
#[tokio::test]
async fn test_receive_after_release() {
    let clock = ManualClock::starting_now();
    let session = locked(&clock, &["a"]);
    session.release();

    let result = session
        .receive(1, Duration::ZERO, ReceiveMode::PeekLock, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.map(|m| m.len()), Err(LockFailure::SessionLockLost));
}
