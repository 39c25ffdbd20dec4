//! Store for entities without sessions.

use super::MessageStore;
use crate::clock::SharedClock;
use crate::engine::QueueEngine;
use crate::error::{BusError, ValidationError};
use crate::message::{LockToken, Message, ReceiveMode, ReceivedMessage, SessionId, Timestamp};
use crate::sessions::LockedSession;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "plain_tests.rs"]
mod tests;

/// A single [`QueueEngine`] that refuses session-tagged messages
#[derive(Debug)]
pub struct PlainMessageStore {
    entity: String,
    queue: QueueEngine,
}

impl PlainMessageStore {
    pub fn new(entity: impl Into<String>, lock_duration: Duration, clock: SharedClock) -> Self {
        let entity = entity.into();
        Self {
            queue: QueueEngine::new(entity.clone(), lock_duration, clock),
            entity,
        }
    }

    /// Path of the owning entity
    pub fn entity(&self) -> &str {
        &self.entity
    }

    fn check_message(&self, message: &Message) -> Result<(), ValidationError> {
        match message.session_id {
            Some(_) => Err(ValidationError::InvalidFormat {
                field: "session_id".to_string(),
                message: format!(
                    "entity {} does not have sessions enabled, messages must not carry a session id",
                    self.entity
                ),
            }),
            None => Ok(()),
        }
    }

    /// See [`QueueEngine::receive`]
    pub async fn receive(
        &self,
        max_messages: u32,
        max_wait: Duration,
        mode: ReceiveMode,
        cancellation: &CancellationToken,
    ) -> Result<Vec<ReceivedMessage>, BusError> {
        self.queue
            .receive(max_messages, max_wait, mode, cancellation)
            .await
    }

    pub fn complete_message(&self, token: &LockToken) -> Result<(), BusError> {
        Ok(self.queue.complete_message(token)?)
    }

    pub fn abandon_message(&self, token: &LockToken) -> Result<(), BusError> {
        Ok(self.queue.abandon_message(token)?)
    }

    pub fn renew_message_lock(&self, token: &LockToken) -> Result<Timestamp, BusError> {
        Ok(self.queue.renew_message_lock(token)?)
    }
}

#[async_trait]
impl MessageStore for PlainMessageStore {
    fn add_message(&self, message: Message) -> Result<(), BusError> {
        self.check_message(&message)?;
        self.queue.add_message(message);
        Ok(())
    }

    fn add_messages(&self, messages: Vec<Message>) -> Result<(), BusError> {
        for message in &messages {
            self.check_message(message)?;
        }
        for message in messages {
            self.queue.add_message(message);
        }
        Ok(())
    }

    async fn try_acquire_next_available_session(
        &self,
        _max_delay: Duration,
        _cancellation: &CancellationToken,
    ) -> Result<Option<LockedSession>, BusError> {
        Err(BusError::SessionsNotEnabled {
            entity: self.entity.clone(),
        })
    }

    fn try_acquire_session(
        &self,
        _session_id: &SessionId,
    ) -> Result<Option<LockedSession>, BusError> {
        Err(BusError::SessionsNotEnabled {
            entity: self.entity.clone(),
        })
    }

    fn active_message_count(&self) -> u64 {
        self.queue.active_message_count()
    }

    fn message_count(&self) -> u64 {
        self.queue.message_count()
    }
}
