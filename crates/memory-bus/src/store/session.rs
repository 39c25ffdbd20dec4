//! Store for session-enabled entities.

use super::MessageStore;
use crate::clock::SharedClock;
use crate::engine::SessionEngine;
use crate::error::{BusError, ValidationError};
use crate::message::{Message, SessionId};
use crate::sessions::LockedSession;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

/// How often acquire-next rescans sessions while waiting.
///
/// Lease expiry is only observed on inspection, so a wake-up signal alone
/// cannot announce a session whose lock lapsed.
pub const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
struct SessionRegistry {
    by_id: HashMap<SessionId, Arc<SessionEngine>>,
    in_creation_order: Vec<Arc<SessionEngine>>,
}

/// Sessions of one entity, created on first message
pub struct SessionMessageStore {
    entity: String,
    lock_duration: Duration,
    clock: SharedClock,
    sessions: Mutex<SessionRegistry>,
    session_available: Arc<Notify>,
}

impl SessionMessageStore {
    pub fn new(entity: impl Into<String>, lock_duration: Duration, clock: SharedClock) -> Self {
        Self {
            entity: entity.into(),
            lock_duration,
            clock,
            sessions: Mutex::new(SessionRegistry::default()),
            session_available: Arc::new(Notify::new()),
        }
    }

    /// Path of the owning entity
    pub fn entity(&self) -> &str {
        &self.entity
    }

    fn lock_sessions(&self) -> MutexGuard<'_, SessionRegistry> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_or_create(&self, session_id: &SessionId) -> Arc<SessionEngine> {
        let mut registry = self.lock_sessions();
        if let Some(engine) = registry.by_id.get(session_id) {
            return Arc::clone(engine);
        }

        debug!(entity = %self.entity, %session_id, "Session created");
        let engine = Arc::new(SessionEngine::new(
            session_id.clone(),
            self.entity.clone(),
            self.lock_duration,
            self.clock.clone(),
            Arc::clone(&self.session_available),
        ));
        registry
            .by_id
            .insert(session_id.clone(), Arc::clone(&engine));
        registry.in_creation_order.push(Arc::clone(&engine));
        engine
    }

    fn required_session_id<'m>(&self, message: &'m Message) -> Result<&'m SessionId, ValidationError> {
        message
            .session_id
            .as_ref()
            .ok_or_else(|| ValidationError::Required {
                field: "session_id".to_string(),
            })
    }

    /// Existing session, for inspection
    pub fn session(&self, session_id: &SessionId) -> Option<Arc<SessionEngine>> {
        self.lock_sessions().by_id.get(session_id).cloned()
    }

    /// IDs of every session seen so far, in creation order
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.lock_sessions()
            .in_creation_order
            .iter()
            .map(|engine| engine.session_id().clone())
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<SessionEngine>> {
        self.lock_sessions().in_creation_order.clone()
    }

    fn try_lock_any(&self) -> Option<LockedSession> {
        self.snapshot()
            .iter()
            .find_map(|engine| engine.try_lock_if_not_empty())
    }

    /// Lock the first available session, in creation order.
    ///
    /// Scans repeatedly until a session is granted or `max_delay` has passed,
    /// waking early whenever a message arrives or a session is released.
    /// Running out of time yields `Ok(None)`; cancellation yields
    /// [`BusError::Cancelled`].
    pub async fn try_acquire_next_available_session(
        &self,
        max_delay: Duration,
        cancellation: &CancellationToken,
    ) -> Result<Option<LockedSession>, BusError> {
        let deadline = Instant::now().checked_add(max_delay);

        loop {
            if cancellation.is_cancelled() {
                return Err(BusError::Cancelled);
            }

            let notified = self.session_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(session) = self.try_lock_any() {
                return Ok(Some(session));
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                debug!(entity = %self.entity, "No session became available");
                return Ok(None);
            }

            let next_scan = now + ACQUIRE_POLL_INTERVAL;
            let wake_at = deadline.map_or(next_scan, |deadline| deadline.min(next_scan));

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Err(BusError::Cancelled),
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    /// Lock the named session if it exists, is free and has messages
    pub fn try_acquire_session(&self, session_id: &SessionId) -> Option<LockedSession> {
        self.session(session_id)
            .and_then(|engine| engine.try_lock_if_not_empty())
    }
}

#[async_trait]
impl MessageStore for SessionMessageStore {
    fn add_message(&self, message: Message) -> Result<(), BusError> {
        let session_id = self.required_session_id(&message)?.clone();
        self.session_or_create(&session_id).add_message(message)
    }

    fn add_messages(&self, messages: Vec<Message>) -> Result<(), BusError> {
        for message in &messages {
            self.required_session_id(message)?;
        }
        for message in messages {
            self.add_message(message)?;
        }
        Ok(())
    }

    async fn try_acquire_next_available_session(
        &self,
        max_delay: Duration,
        cancellation: &CancellationToken,
    ) -> Result<Option<LockedSession>, BusError> {
        SessionMessageStore::try_acquire_next_available_session(self, max_delay, cancellation).await
    }

    fn try_acquire_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<LockedSession>, BusError> {
        Ok(SessionMessageStore::try_acquire_session(self, session_id))
    }

    fn active_message_count(&self) -> u64 {
        self.snapshot()
            .iter()
            .map(|engine| engine.active_message_count())
            .sum()
    }

    fn message_count(&self) -> u64 {
        self.snapshot()
            .iter()
            .map(|engine| engine.message_count())
            .sum()
    }
}

impl std::fmt::Debug for SessionMessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMessageStore")
            .field("entity", &self.entity)
            .field("lock_duration", &self.lock_duration)
            .finish_non_exhaustive()
    }
}
