//! Queues, topics and subscriptions.
//!
//! A [`Queue`] and a [`Subscription`] each own one [`EntityStore`]. A
//! [`Topic`] owns no messages: sending to it copies the message into every
//! subscription in turn. The copy is not atomic across subscriptions: if one
//! subscription rejects the message, those visited before it keep their
//! copy and those after it never receive one. With no subscriptions, sent
//! messages are discarded.

use crate::clock::SharedClock;
use crate::config::EntityOptions;
use crate::error::BusError;
use crate::message::{EntityName, Message};
use crate::store::{EntityStore, MessageStore};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;

/// How often [`Queue::wait_until_empty`] and
/// [`Subscription::wait_until_empty`] re-read the message count
pub const EMPTY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Poll `store` until it holds no messages or `max_wait` has passed
async fn wait_until_empty(
    path: &str,
    store: &EntityStore,
    max_wait: Duration,
) -> Result<(), BusError> {
    let deadline = Instant::now().checked_add(max_wait);

    loop {
        let message_count = store.message_count();
        if message_count == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let wake_at = match deadline {
            Some(deadline) if now >= deadline => {
                debug!(entity = %path, message_count, "Entity did not drain in time");
                return Err(BusError::NotEmpty {
                    entity: path.to_string(),
                    message_count,
                });
            }
            Some(deadline) => deadline.min(now + EMPTY_POLL_INTERVAL),
            None => now + EMPTY_POLL_INTERVAL,
        };
        tokio::time::sleep_until(wake_at).await;
    }
}

/// A point-to-point entity
#[derive(Debug)]
pub struct Queue {
    name: EntityName,
    path: String,
    options: EntityOptions,
    store: EntityStore,
}

impl Queue {
    pub(crate) fn new(namespace: &EntityName, name: EntityName, options: EntityOptions, clock: SharedClock) -> Self {
        let path = format!("{}/{}", namespace, name);
        let store = EntityStore::new(path.clone(), &options, clock);
        Self {
            name,
            path,
            options,
            store,
        }
    }

    pub fn name(&self) -> &EntityName {
        &self.name
    }

    /// `namespace/queue`, as used in diagnostics
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn options(&self) -> &EntityOptions {
        &self.options
    }

    /// The store receivers consume from
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn add_message(&self, message: Message) -> Result<(), BusError> {
        self.store.add_message(message)
    }

    pub fn add_messages(&self, messages: Vec<Message>) -> Result<(), BusError> {
        self.store.add_messages(messages)
    }

    pub fn active_message_count(&self) -> u64 {
        self.store.active_message_count()
    }

    pub fn message_count(&self) -> u64 {
        self.store.message_count()
    }

    /// Wait until every message, locked ones included, has been settled.
    ///
    /// Fails with [`BusError::NotEmpty`] if messages remain after `max_wait`.
    pub async fn wait_until_empty(&self, max_wait: Duration) -> Result<(), BusError> {
        wait_until_empty(&self.path, &self.store, max_wait).await
    }
}

/// A publish/subscribe entity fanning out to its subscriptions
#[derive(Debug)]
pub struct Topic {
    name: EntityName,
    path: String,
    options: EntityOptions,
    clock: SharedClock,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
}

impl Topic {
    pub(crate) fn new(namespace: &EntityName, name: EntityName, options: EntityOptions, clock: SharedClock) -> Self {
        Self {
            path: format!("{}/{}", namespace, name),
            name,
            options,
            clock,
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &EntityName {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Options shared by every subscription of this topic
    pub fn options(&self) -> &EntityOptions {
        &self.options
    }

    /// Create a subscription; it only sees messages sent after this call
    pub fn add_subscription(&self, name: impl Into<String>) -> Result<Arc<Subscription>, BusError> {
        let name = EntityName::new(name)?;
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if subscriptions.iter().any(|s| s.name == name) {
            return Err(BusError::EntityAlreadyExists {
                entity: format!("{}/subscriptions/{}", self.path, name),
            });
        }

        let subscription = Arc::new(Subscription::new(
            self,
            name,
            self.clock.clone(),
        ));
        info!(subscription = %subscription.path, "Subscription created");
        subscriptions.push(Arc::clone(&subscription));
        Ok(subscription)
    }

    pub fn subscription(&self, name: &str) -> Result<Arc<Subscription>, BusError> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.name.as_str() == name)
            .cloned()
            .ok_or_else(|| BusError::EntityNotFound {
                entity: format!("{}/subscriptions/{}", self.path, name),
            })
    }

    /// Subscriptions in creation order
    pub fn subscriptions(&self) -> Vec<Arc<Subscription>> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy `message` into every subscription, stopping at the first rejection
    pub fn add_message(&self, message: Message) -> Result<(), BusError> {
        let subscriptions = self.subscriptions();
        if subscriptions.is_empty() {
            debug!(topic = %self.path, message_id = %message.message_id, "No subscriptions, message dropped");
            return Ok(());
        }

        for subscription in subscriptions {
            subscription.store.add_message(message.clone())?;
        }
        Ok(())
    }

    /// Copy a batch into every subscription, stopping at the first rejection
    pub fn add_messages(&self, messages: Vec<Message>) -> Result<(), BusError> {
        let subscriptions = self.subscriptions();
        if subscriptions.is_empty() {
            debug!(topic = %self.path, count = messages.len(), "No subscriptions, messages dropped");
            return Ok(());
        }

        for subscription in subscriptions {
            subscription.store.add_messages(messages.clone())?;
        }
        Ok(())
    }
}

/// A topic's independent copy of the message stream
#[derive(Debug)]
pub struct Subscription {
    name: EntityName,
    topic: EntityName,
    path: String,
    store: EntityStore,
}

impl Subscription {
    fn new(topic: &Topic, name: EntityName, clock: SharedClock) -> Self {
        let path = format!("{}/subscriptions/{}", topic.path, name);
        let store = EntityStore::new(path.clone(), &topic.options, clock);
        Self {
            name,
            topic: topic.name.clone(),
            path,
            store,
        }
    }

    pub fn name(&self) -> &EntityName {
        &self.name
    }

    pub fn topic_name(&self) -> &EntityName {
        &self.topic
    }

    /// `namespace/topic/subscriptions/subscription`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn active_message_count(&self) -> u64 {
        self.store.active_message_count()
    }

    pub fn message_count(&self) -> u64 {
        self.store.message_count()
    }

    /// Wait until the subscription has no messages; see [`Queue::wait_until_empty`]
    pub async fn wait_until_empty(&self, max_wait: Duration) -> Result<(), BusError> {
        wait_until_empty(&self.path, &self.store, max_wait).await
    }
}

/// Any entity a namespace can hold
#[derive(Debug, Clone)]
pub enum Entity {
    Queue(Arc<Queue>),
    Topic(Arc<Topic>),
}

impl Entity {
    pub fn name(&self) -> &EntityName {
        match self {
            Self::Queue(queue) => queue.name(),
            Self::Topic(topic) => topic.name(),
        }
    }

    pub fn options(&self) -> &EntityOptions {
        match self {
            Self::Queue(queue) => queue.options(),
            Self::Topic(topic) => topic.options(),
        }
    }

    /// Send to the entity, whatever its kind
    pub fn add_message(&self, message: Message) -> Result<(), BusError> {
        match self {
            Self::Queue(queue) => queue.add_message(message),
            Self::Topic(topic) => topic.add_message(message),
        }
    }

    pub fn add_messages(&self, messages: Vec<Message>) -> Result<(), BusError> {
        match self {
            Self::Queue(queue) => queue.add_messages(messages),
            Self::Topic(topic) => topic.add_messages(messages),
        }
    }
}
