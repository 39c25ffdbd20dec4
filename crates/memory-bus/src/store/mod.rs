//! Message stores backing queues and subscriptions.
//!
//! An entity owns exactly one store, chosen at creation from its
//! [`EntityOptions`]: a [`PlainMessageStore`] over a single queue engine, or a
//! [`SessionMessageStore`] holding one engine per session. [`MessageStore`] is
//! the surface both share; receive and settlement differ between the two and
//! live on the concrete types, reachable through [`EntityStore::as_plain`] and
//! [`EntityStore::as_sessions`].

use crate::clock::SharedClock;
use crate::config::EntityOptions;
use crate::error::BusError;
use crate::message::{Message, SessionId};
use crate::sessions::LockedSession;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod plain;
mod session;

pub use plain::PlainMessageStore;
pub use session::{SessionMessageStore, ACQUIRE_POLL_INTERVAL};

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

/// Operations common to every store
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Enqueue one message
    fn add_message(&self, message: Message) -> Result<(), BusError>;

    /// Enqueue a batch; nothing is enqueued if any message is rejected
    fn add_messages(&self, messages: Vec<Message>) -> Result<(), BusError>;

    /// Lock whichever session first has messages, waiting up to `max_delay`.
    ///
    /// `Ok(None)` means no session became available in time.
    async fn try_acquire_next_available_session(
        &self,
        max_delay: Duration,
        cancellation: &CancellationToken,
    ) -> Result<Option<LockedSession>, BusError>;

    /// Lock a specific session if it is free and has messages
    fn try_acquire_session(&self, session_id: &SessionId)
        -> Result<Option<LockedSession>, BusError>;

    /// Messages eligible for delivery
    fn active_message_count(&self) -> u64;

    /// All messages, including locked ones
    fn message_count(&self) -> u64;
}

/// The store owned by a queue or subscription
#[derive(Debug)]
pub enum EntityStore {
    Plain(PlainMessageStore),
    Sessions(SessionMessageStore),
}

impl EntityStore {
    /// Create the store matching `options.enable_sessions`
    pub fn new(entity: impl Into<String>, options: &EntityOptions, clock: SharedClock) -> Self {
        let entity = entity.into();
        if options.enable_sessions {
            Self::Sessions(SessionMessageStore::new(
                entity,
                options.lock_duration,
                clock,
            ))
        } else {
            Self::Plain(PlainMessageStore::new(entity, options.lock_duration, clock))
        }
    }

    /// Whether the entity requires session-aware consumption
    pub fn sessions_enabled(&self) -> bool {
        matches!(self, Self::Sessions(_))
    }

    /// The plain store, for receivers that do not use sessions
    pub fn as_plain(&self) -> Result<&PlainMessageStore, BusError> {
        match self {
            Self::Plain(store) => Ok(store),
            Self::Sessions(store) => Err(BusError::FeatureNotSupported {
                feature: format!(
                    "receiving without a session from session-enabled entity {}",
                    store.entity()
                ),
            }),
        }
    }

    /// The session store, for session receivers
    pub fn as_sessions(&self) -> Result<&SessionMessageStore, BusError> {
        match self {
            Self::Sessions(store) => Ok(store),
            Self::Plain(store) => Err(BusError::SessionsNotEnabled {
                entity: store.entity().to_string(),
            }),
        }
    }

    fn as_store(&self) -> &dyn MessageStore {
        match self {
            Self::Plain(store) => store,
            Self::Sessions(store) => store,
        }
    }
}

#[async_trait]
impl MessageStore for EntityStore {
    fn add_message(&self, message: Message) -> Result<(), BusError> {
        self.as_store().add_message(message)
    }

    fn add_messages(&self, messages: Vec<Message>) -> Result<(), BusError> {
        self.as_store().add_messages(messages)
    }

    async fn try_acquire_next_available_session(
        &self,
        max_delay: Duration,
        cancellation: &CancellationToken,
    ) -> Result<Option<LockedSession>, BusError> {
        self.as_store()
            .try_acquire_next_available_session(max_delay, cancellation)
            .await
    }

    fn try_acquire_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<LockedSession>, BusError> {
        self.as_store().try_acquire_session(session_id)
    }

    fn active_message_count(&self) -> u64 {
        self.as_store().active_message_count()
    }

    fn message_count(&self) -> u64 {
        self.as_store().message_count()
    }
}
