//! Per-session engine: one private queue, one exclusive lock, one state blob.

use super::QueueEngine;
use crate::clock::SharedClock;
use crate::error::{BusError, LockFailure, ValidationError};
use crate::message::{
    LockToken, Message, ReceiveMode, ReceivedMessage, SessionId, SessionLockToken, Timestamp,
};
use crate::sessions::{LockedSession, SessionResult};
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

#[derive(Debug, Clone, Copy)]
struct SessionLease {
    token: SessionLockToken,
    locked_until: Timestamp,
}

impl SessionLease {
    fn is_expired(&self, now: Timestamp) -> bool {
        self.locked_until < now
    }
}

#[derive(Debug, Default)]
struct SessionState {
    lease: Option<SessionLease>,
    state: Option<Bytes>,
}

/// Messages and lock bookkeeping for a single session.
///
/// Every operation other than [`add_message`](Self::add_message) and
/// [`try_lock_if_not_empty`](Self::try_lock_if_not_empty) must present the
/// [`LockedSession`] handle granted by the latter. A handle whose token no
/// longer matches, or whose lease has lapsed, fails with
/// [`LockFailure::SessionLockLost`] and leaves the session untouched.
///
/// The session mutex is always taken before the inner queue's mutex.
pub struct SessionEngine {
    session_id: SessionId,
    entity: String,
    lock_duration: Duration,
    clock: SharedClock,
    queue: QueueEngine,
    inner: Mutex<SessionState>,
    session_available: Arc<Notify>,
}

impl SessionEngine {
    /// Create an empty session.
    ///
    /// `session_available` is signalled whenever this session may have become
    /// acquirable (a message arrived or the lock was released).
    pub fn new(
        session_id: SessionId,
        entity: impl Into<String>,
        lock_duration: Duration,
        clock: SharedClock,
        session_available: Arc<Notify>,
    ) -> Self {
        let entity = entity.into();
        let queue = QueueEngine::new(
            format!("{}/sessions/{}", entity, session_id),
            lock_duration,
            clock.clone(),
        );

        Self {
            session_id,
            entity,
            lock_duration,
            clock,
            queue,
            inner: Mutex::new(SessionState::default()),
            session_available,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn lock_inner(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the session state if `session` still holds a live lease
    fn held_by(&self, session: &LockedSession) -> SessionResult<MutexGuard<'_, SessionState>> {
        let now = self.clock.now();
        let inner = self.lock_inner();

        match inner.lease {
            Some(lease) if lease.token == session.lock_token() && !lease.is_expired(now) => {
                Ok(inner)
            }
            _ => {
                debug!(
                    entity = %self.entity,
                    session_id = %self.session_id,
                    lock_token = %session.lock_token(),
                    "Session lock no longer held"
                );
                Err(LockFailure::SessionLockLost)
            }
        }
    }

    fn check_held_by(&self, session: &LockedSession) -> SessionResult {
        self.held_by(session).map(|_| ())
    }

    /// Enqueue a message belonging to this session
    pub fn add_message(&self, message: Message) -> Result<(), BusError> {
        if message.session_id.as_ref() != Some(&self.session_id) {
            return Err(ValidationError::InvalidFormat {
                field: "session_id".to_string(),
                message: format!(
                    "message does not belong to session '{}'",
                    self.session_id
                ),
            }
            .into());
        }

        self.queue.add_message(message);
        self.session_available.notify_waiters();
        Ok(())
    }

    /// Grant the session lock if it is free and there is something to receive.
    ///
    /// A lease that has lapsed counts as free. Returns `None` without side
    /// effects when the session is held or empty.
    pub fn try_lock_if_not_empty(self: &Arc<Self>) -> Option<LockedSession> {
        let now = self.clock.now();
        let mut inner = self.lock_inner();

        if inner.lease.is_some_and(|lease| !lease.is_expired(now)) {
            return None;
        }

        if self.queue.active_message_count() == 0 {
            return None;
        }

        let lease = SessionLease {
            token: SessionLockToken::new(),
            locked_until: now.saturating_add(self.lock_duration),
        };
        inner.lease = Some(lease);

        debug!(
            entity = %self.entity,
            session_id = %self.session_id,
            lock_token = %lease.token,
            locked_until = %lease.locked_until,
            "Session lock granted"
        );
        Some(LockedSession::new(Arc::clone(self), lease.token))
    }

    /// Give up the lock held by `session`.
    ///
    /// A no-op when the lock has since been granted to someone else.
    pub fn release(&self, session: &LockedSession) {
        let released = {
            let mut inner = self.lock_inner();
            match inner.lease {
                Some(lease) if lease.token == session.lock_token() => {
                    inner.lease = None;
                    true
                }
                _ => false,
            }
        };

        if released {
            debug!(entity = %self.entity, session_id = %self.session_id, "Session lock released");
            self.session_available.notify_waiters();
        }
    }

    /// Receive from this session's queue on behalf of the lock holder
    pub async fn receive(
        &self,
        session: &LockedSession,
        max_messages: u32,
        max_wait: Duration,
        mode: ReceiveMode,
        cancellation: &CancellationToken,
    ) -> Result<SessionResult<Vec<ReceivedMessage>>, BusError> {
        if let Err(failure) = self.check_held_by(session) {
            return Ok(Err(failure));
        }

        let messages = self
            .queue
            .receive(max_messages, max_wait, mode, cancellation)
            .await?;
        Ok(Ok(messages))
    }

    pub fn complete_message(&self, session: &LockedSession, token: &LockToken) -> SessionResult {
        let _held = self.held_by(session)?;
        self.queue.complete_message(token)
    }

    pub fn abandon_message(&self, session: &LockedSession, token: &LockToken) -> SessionResult {
        let _held = self.held_by(session)?;
        self.queue.abandon_message(token)
    }

    pub fn renew_message_lock(
        &self,
        session: &LockedSession,
        token: &LockToken,
    ) -> SessionResult<Timestamp> {
        let _held = self.held_by(session)?;
        self.queue.renew_message_lock(token)
    }

    /// Extend the session lease by the lock duration, returning the new expiry
    pub fn renew_session_lock(&self, session: &LockedSession) -> SessionResult<Timestamp> {
        let mut inner = self.held_by(session)?;
        let locked_until = self.clock.now().saturating_add(self.lock_duration);
        inner.lease = Some(SessionLease {
            token: session.lock_token(),
            locked_until,
        });

        debug!(
            entity = %self.entity,
            session_id = %self.session_id,
            %locked_until,
            "Session lock renewed"
        );
        Ok(locked_until)
    }

    /// Session state; empty when never set
    pub fn get_session_state(&self, session: &LockedSession) -> SessionResult<Bytes> {
        let inner = self.held_by(session)?;
        Ok(inner.state.clone().unwrap_or_default())
    }

    /// Overwrite the session state (last write wins)
    pub fn set_session_state(&self, session: &LockedSession, state: Bytes) -> SessionResult {
        let mut inner = self.held_by(session)?;
        inner.state = Some(state);
        Ok(())
    }

    /// Whether a live lease is currently held
    pub fn is_locked(&self) -> bool {
        self.locked_until().is_some()
    }

    /// Expiry of the live lease, if any
    pub fn locked_until(&self) -> Option<Timestamp> {
        let now = self.clock.now();
        self.lock_inner()
            .lease
            .filter(|lease| !lease.is_expired(now))
            .map(|lease| lease.locked_until)
    }

    pub(crate) fn holds_lease(&self, token: SessionLockToken) -> Option<Timestamp> {
        let now = self.clock.now();
        self.lock_inner()
            .lease
            .filter(|lease| lease.token == token && !lease.is_expired(now))
            .map(|lease| lease.locked_until)
    }

    pub fn active_message_count(&self) -> u64 {
        self.queue.active_message_count()
    }

    pub fn message_count(&self) -> u64 {
        self.queue.message_count()
    }
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("entity", &self.entity)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
