//! Session lock handles and session operation outcomes.
//!
//! Acquiring a session (see
//! [`SessionMessageStore`](crate::store::SessionMessageStore)) yields a
//! [`LockedSession`]: a capability pairing the session with the lock token
//! granted to its holder. Every session-scoped operation requires the handle
//! and reports lock loss through [`SessionResult`] rather than through
//! [`BusError`], because losing a lock is an expected outcome that callers
//! handle inline.
//!
//! # Example
//!
//! ```rust
//! use memory_bus::{Message, MessageStore, ReceiveMode, SessionId, SessionMessageStore};
//! use memory_bus::clock::{ManualClock, SharedClock};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let clock: SharedClock = Arc::new(ManualClock::starting_now());
//! let store = SessionMessageStore::new("ns/orders", Duration::from_secs(30), clock);
//!
//! let order = SessionId::new("order-42").unwrap();
//! store.add_message(Message::new("created").with_session_id(order.clone())).unwrap();
//!
//! let session = store.try_acquire_session(&order).expect("session has a message");
//! let messages = session
//!     .receive(1, Duration::ZERO, ReceiveMode::PeekLock, &CancellationToken::new())
//!     .await
//!     .unwrap()
//!     .unwrap();
//!
//! session.complete_message(messages[0].lock_token().unwrap()).unwrap();
//! session.release();
//! # });
//! ```

use crate::engine::SessionEngine;
use crate::error::{BusError, LockFailure};
use crate::message::{LockToken, ReceiveMode, ReceivedMessage, SessionId, SessionLockToken, Timestamp};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;

/// Outcome of a session-scoped operation.
///
/// `Err` carries [`LockFailure::SessionLockLost`] when the handle no longer
/// holds the session, or [`LockFailure::MessageLockLost`] when the session is
/// held but the message lock is not.
pub type SessionResult<T = ()> = Result<T, LockFailure>;

/// Capability to operate on a session while holding its lock.
///
/// Cloning the handle does not duplicate the lock: all clones share the same
/// token, and releasing through any of them releases it for all.
#[derive(Clone)]
pub struct LockedSession {
    engine: Arc<SessionEngine>,
    token: SessionLockToken,
}

impl LockedSession {
    pub(crate) fn new(engine: Arc<SessionEngine>, token: SessionLockToken) -> Self {
        Self { engine, token }
    }

    pub fn session_id(&self) -> &SessionId {
        self.engine.session_id()
    }

    /// Token identifying this grant of the session lock
    pub fn lock_token(&self) -> SessionLockToken {
        self.token
    }

    /// Current lease expiry, or `None` once this handle has lost the lock
    pub fn locked_until(&self) -> Option<Timestamp> {
        self.engine.holds_lease(self.token)
    }

    /// Whether this handle still holds a live lease
    pub fn is_held(&self) -> bool {
        self.locked_until().is_some()
    }

    /// Receive from the session; see [`SessionEngine::receive`]
    pub async fn receive(
        &self,
        max_messages: u32,
        max_wait: Duration,
        mode: ReceiveMode,
        cancellation: &CancellationToken,
    ) -> Result<SessionResult<Vec<ReceivedMessage>>, BusError> {
        self.engine
            .receive(self, max_messages, max_wait, mode, cancellation)
            .await
    }

    pub fn complete_message(&self, token: &LockToken) -> SessionResult {
        self.engine.complete_message(self, token)
    }

    pub fn abandon_message(&self, token: &LockToken) -> SessionResult {
        self.engine.abandon_message(self, token)
    }

    pub fn renew_message_lock(&self, token: &LockToken) -> SessionResult<Timestamp> {
        self.engine.renew_message_lock(self, token)
    }

    pub fn renew_session_lock(&self) -> SessionResult<Timestamp> {
        self.engine.renew_session_lock(self)
    }

    pub fn get_session_state(&self) -> SessionResult<Bytes> {
        self.engine.get_session_state(self)
    }

    pub fn set_session_state(&self, state: impl Into<Bytes>) -> SessionResult {
        self.engine.set_session_state(self, state.into())
    }

    /// Give up the session lock; a no-op if it was already lost
    pub fn release(&self) {
        self.engine.release(self)
    }

    /// The engine this handle was granted by
    pub fn engine(&self) -> &Arc<SessionEngine> {
        &self.engine
    }
}

impl std::fmt::Debug for LockedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockedSession")
            .field("session_id", self.session_id())
            .field("lock_token", &self.token)
            .finish()
    }
}
