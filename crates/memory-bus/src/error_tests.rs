//! Tests for error types.

use super::*;

#[test]
fn test_lock_failure_conversion() {
    let error: BusError = LockFailure::MessageLockLost.into();
    assert!(error.is_lock_lost());
    assert_eq!(error.lock_failure(), Some(LockFailure::MessageLockLost));
    assert!(!error.is_cancelled());

    let error: BusError = LockFailure::SessionLockLost.into();
    assert_eq!(error.lock_failure(), Some(LockFailure::SessionLockLost));
}

#[test]
fn test_cancellation_is_not_lock_loss() {
    let error = BusError::Cancelled;
    assert!(error.is_cancelled());
    assert!(!error.is_lock_lost());
    assert_eq!(error.lock_failure(), None);
}

#[test]
fn test_error_messages() {
    assert_eq!(
        BusError::from(LockFailure::SessionLockLost).to_string(),
        "Session lock lost"
    );

    let not_found = BusError::EntityNotFound {
        entity: "ns/orders".to_string(),
    };
    assert_eq!(not_found.to_string(), "Messaging entity not found: ns/orders");

    let validation: BusError = ValidationError::Required {
        field: "session_id".to_string(),
    }
    .into();
    assert_eq!(
        validation.to_string(),
        "Validation error: Required field missing: session_id"
    );
}
