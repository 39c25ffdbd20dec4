//! The lock-based FIFO store underlying every queue, subscription and session.
//!
//! A [`QueueEngine`] keeps each message in exactly one of three places:
//!
//! - the *ready* queue, for messages never delivered,
//! - the *redelivery* queue, for messages abandoned or whose lock expired,
//! - the *lock table*, for messages currently held under peek-lock.
//!
//! Redelivery is always drained before ready. Lock expiry is pull-based: every
//! operation first moves expired locks back to redelivery, so no background
//! timer is needed and a virtual clock fully controls expiry.

use crate::clock::SharedClock;
use crate::error::{BusError, LockFailure, ValidationError};
use crate::message::{LockToken, Message, ReceiveMode, ReceivedMessage, Timestamp};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message waiting in the ready or redelivery queue
struct StoredMessage {
    message: Message,
    sequence_number: u64,
    enqueued_at: Timestamp,
    delivery_count: u32,
}

impl StoredMessage {
    fn to_received(&self, lock: Option<(LockToken, Timestamp)>) -> ReceivedMessage {
        ReceivedMessage {
            message_id: self.message.message_id.clone(),
            body: self.message.body.clone(),
            properties: self.message.properties.clone(),
            session_id: self.message.session_id.clone(),
            correlation_id: self.message.correlation_id.clone(),
            content_type: self.message.content_type.clone(),
            sequence_number: self.sequence_number,
            enqueued_at: self.enqueued_at,
            delivery_count: self.delivery_count,
            lock,
        }
    }
}

/// A message held under peek-lock
struct LockedMessage {
    stored: StoredMessage,
    locked_until: Timestamp,
}

impl LockedMessage {
    fn is_expired(&self, now: Timestamp) -> bool {
        self.locked_until < now
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    redelivery: VecDeque<StoredMessage>,
    locked: HashMap<LockToken, LockedMessage>,
    last_sequence_number: u64,
}

impl QueueState {
    /// Move every expired lock back to redelivery, oldest message first
    fn release_expired_locks(&mut self, now: Timestamp) -> usize {
        let mut expired: Vec<(u64, LockToken)> = self
            .locked
            .iter()
            .filter(|(_, locked)| locked.is_expired(now))
            .map(|(token, locked)| (locked.stored.sequence_number, *token))
            .collect();
        expired.sort_unstable_by_key(|(sequence_number, _)| *sequence_number);

        for (_, token) in &expired {
            self.unlock_and_requeue(token);
        }

        expired.len()
    }

    fn unlock_and_requeue(&mut self, token: &LockToken) -> bool {
        match self.locked.remove(token) {
            Some(locked) => {
                self.redelivery.push_back(locked.stored);
                true
            }
            None => false,
        }
    }

    fn dequeue(&mut self) -> Option<StoredMessage> {
        self.redelivery
            .pop_front()
            .or_else(|| self.ready.pop_front())
    }

    fn active_count(&self) -> usize {
        self.ready.len() + self.redelivery.len()
    }

    fn total_count(&self) -> usize {
        self.active_count() + self.locked.len()
    }

    fn issue_lock_token(&self) -> LockToken {
        loop {
            let token = LockToken::new();
            if !self.locked.contains_key(&token) {
                return token;
            }
        }
    }
}

// ============================================================================
// QueueEngine
// ============================================================================

/// FIFO message store with peek-lock and receive-and-delete delivery
pub struct QueueEngine {
    entity: String,
    lock_duration: Duration,
    clock: SharedClock,
    state: Mutex<QueueState>,
    message_available: Notify,
}

impl QueueEngine {
    /// Create an empty engine; `entity` is only used for diagnostics
    pub fn new(entity: impl Into<String>, lock_duration: Duration, clock: SharedClock) -> Self {
        Self {
            entity: entity.into(),
            lock_duration,
            clock,
            state: Mutex::new(QueueState::default()),
            message_available: Notify::new(),
        }
    }

    /// Lock duration applied to every delivery and renewal
    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the state after returning expired locks to circulation
    fn reconciled_state(&self) -> (MutexGuard<'_, QueueState>, Timestamp) {
        let now = self.clock.now();
        let mut state = self.lock_state();
        let released = state.release_expired_locks(now);
        if released > 0 {
            debug!(entity = %self.entity, count = released, "Expired message locks returned for redelivery");
        }
        (state, now)
    }

    /// Append a message to the ready queue and wake blocked receivers
    pub fn add_message(&self, message: Message) {
        let enqueued_at = self.clock.now();
        {
            let mut state = self.lock_state();
            state.last_sequence_number += 1;
            let sequence_number = state.last_sequence_number;
            debug!(
                entity = %self.entity,
                message_id = %message.message_id,
                sequence_number,
                "Message enqueued"
            );
            state.ready.push_back(StoredMessage {
                message,
                sequence_number,
                enqueued_at,
                delivery_count: 0,
            });
        }
        self.message_available.notify_waiters();
    }

    /// Receive up to `max_messages`, waiting at most `max_wait` to fill the batch.
    ///
    /// Returns once `max_messages` have been collected. Running out of
    /// `max_wait` is not an error: whatever was collected, possibly nothing,
    /// is returned. Cancellation through `cancellation` always yields
    /// [`BusError::Cancelled`], even mid-wait; messages already locked for
    /// this call stay locked until they expire.
    pub async fn receive(
        &self,
        max_messages: u32,
        max_wait: Duration,
        mode: ReceiveMode,
        cancellation: &CancellationToken,
    ) -> Result<Vec<ReceivedMessage>, BusError> {
        if max_messages == 0 {
            return Err(ValidationError::OutOfRange {
                field: "max_messages".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }

        let deadline = Instant::now().checked_add(max_wait);
        let mut received = Vec::new();

        loop {
            if cancellation.is_cancelled() {
                return Err(BusError::Cancelled);
            }

            // Register interest before inspecting the queues so an add that
            // lands in between still wakes this receiver.
            let notified = self.message_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let (mut state, now) = self.reconciled_state();
                while received.len() < max_messages as usize {
                    let Some(stored) = state.dequeue() else {
                        break;
                    };
                    let message = self.finish_receive(&mut state, stored, mode, now);
                    received.push(message);
                }
            }

            if received.len() == max_messages as usize {
                return Ok(received);
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(received);
            }

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Err(BusError::Cancelled),
                _ = &mut notified => {}
                _ = wait_until(deadline) => return Ok(received),
            }
        }
    }

    fn finish_receive(
        &self,
        state: &mut QueueState,
        mut stored: StoredMessage,
        mode: ReceiveMode,
        now: Timestamp,
    ) -> ReceivedMessage {
        stored.delivery_count += 1;

        match mode {
            ReceiveMode::ReceiveAndDelete => {
                debug!(
                    entity = %self.entity,
                    sequence_number = stored.sequence_number,
                    "Message delivered and deleted"
                );
                stored.to_received(None)
            }
            ReceiveMode::PeekLock => {
                let token = state.issue_lock_token();
                let locked_until = now.saturating_add(self.lock_duration);
                debug!(
                    entity = %self.entity,
                    sequence_number = stored.sequence_number,
                    lock_token = %token,
                    %locked_until,
                    "Message delivered under lock"
                );
                let received = stored.to_received(Some((token, locked_until)));
                state.locked.insert(
                    token,
                    LockedMessage {
                        stored,
                        locked_until,
                    },
                );
                received
            }
        }
    }

    /// Settle a locked message, removing it from the engine
    pub fn complete_message(&self, token: &LockToken) -> Result<(), LockFailure> {
        let (mut state, _) = self.reconciled_state();

        match state.locked.remove(token) {
            Some(_) => {
                debug!(entity = %self.entity, lock_token = %token, "Message completed");
                Ok(())
            }
            None => Err(LockFailure::MessageLockLost),
        }
    }

    /// Release a locked message to the back of the redelivery queue
    pub fn abandon_message(&self, token: &LockToken) -> Result<(), LockFailure> {
        let requeued = {
            let (mut state, _) = self.reconciled_state();
            state.unlock_and_requeue(token)
        };

        if !requeued {
            return Err(LockFailure::MessageLockLost);
        }

        debug!(entity = %self.entity, lock_token = %token, "Message abandoned");
        self.message_available.notify_waiters();
        Ok(())
    }

    /// Extend a message lock by the lock duration, returning the new expiry
    pub fn renew_message_lock(&self, token: &LockToken) -> Result<Timestamp, LockFailure> {
        let (mut state, now) = self.reconciled_state();

        let locked = state
            .locked
            .get_mut(token)
            .ok_or(LockFailure::MessageLockLost)?;
        locked.locked_until = now.saturating_add(self.lock_duration);

        debug!(
            entity = %self.entity,
            lock_token = %token,
            locked_until = %locked.locked_until,
            "Message lock renewed"
        );
        Ok(locked.locked_until)
    }

    /// Messages eligible for delivery (ready plus redelivery)
    pub fn active_message_count(&self) -> u64 {
        self.reconciled_state().0.active_count() as u64
    }

    /// All messages held, including locked ones
    pub fn message_count(&self) -> u64 {
        self.reconciled_state().0.total_count() as u64
    }
}

impl std::fmt::Debug for QueueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEngine")
            .field("entity", &self.entity)
            .field("lock_duration", &self.lock_duration)
            .finish_non_exhaustive()
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
