//! Bus provider and namespaces.
//!
//! A [`BusProvider`] is the root of an emulated bus: it holds namespaces, and
//! every entity created beneath it reads lock expiry from the provider's
//! clock. Topologies can be built programmatically or from a
//! [`TopologyConfig`].

use crate::clock::{SharedClock, SystemClock};
use crate::config::{EntityOptions, TopologyConfig};
use crate::entity::{Entity, Queue, Topic};
use crate::error::BusError;
use crate::message::EntityName;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;
use uuid::Uuid;

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;

/// Host name suffix for namespaces created without an explicit name
pub const GENERATED_NAMESPACE_SUFFIX: &str = "bus.in-memory.local";

/// Root registry of namespaces sharing one clock
#[derive(Debug)]
pub struct BusProvider {
    clock: SharedClock,
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
}

impl BusProvider {
    /// Provider on wall-clock time
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Provider reading lock expiry from `clock`
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            clock,
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Build every namespace, queue, topic and subscription in `topology`
    pub fn from_topology(topology: &TopologyConfig, clock: SharedClock) -> Result<Self, BusError> {
        topology.validate()?;
        let provider = Self::with_clock(clock);

        for namespace_config in &topology.namespaces {
            let namespace = provider.add_namespace(Some(&namespace_config.name))?;

            for queue in &namespace_config.queues {
                namespace.add_queue(&queue.name, topology.queue_options(queue))?;
            }

            for topic_config in &namespace_config.topics {
                let topic =
                    namespace.add_topic(&topic_config.name, topology.topic_options(topic_config))?;
                for subscription in &topic_config.subscriptions {
                    topic.add_subscription(subscription.as_str())?;
                }
            }
        }

        info!(
            namespaces = topology.namespaces.len(),
            "Bus topology created"
        );
        Ok(provider)
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Create a namespace, generating a unique host name when none is given
    pub fn add_namespace(&self, name: Option<&str>) -> Result<Arc<Namespace>, BusError> {
        let name = match name {
            Some(name) => EntityName::new(name)?,
            None => EntityName::new(format!(
                "{}.{}",
                Uuid::new_v4(),
                GENERATED_NAMESPACE_SUFFIX
            ))?,
        };

        let mut namespaces = self
            .namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if namespaces.contains_key(name.as_str()) {
            return Err(BusError::NamespaceAlreadyExists {
                namespace: name.to_string(),
            });
        }

        info!(namespace = %name, "Namespace created");
        let namespace = Arc::new(Namespace::new(name.clone(), self.clock.clone()));
        namespaces.insert(name.to_string(), Arc::clone(&namespace));
        Ok(namespace)
    }

    pub fn namespace(&self, name: &str) -> Result<Arc<Namespace>, BusError> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::NamespaceNotFound {
                namespace: name.to_string(),
            })
    }
}

impl Default for BusProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// A named container of queues and topics
#[derive(Debug)]
pub struct Namespace {
    name: EntityName,
    clock: SharedClock,
    entities: RwLock<HashMap<String, Entity>>,
}

impl Namespace {
    fn new(name: EntityName, clock: SharedClock) -> Self {
        Self {
            name,
            clock,
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Fully qualified host name of the namespace
    pub fn name(&self) -> &EntityName {
        &self.name
    }

    fn insert(&self, entity: Entity) -> Result<(), BusError> {
        let mut entities = self
            .entities
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let key = entity.name().as_str().to_string();

        if entities.contains_key(&key) {
            return Err(BusError::EntityAlreadyExists {
                entity: format!("{}/{}", self.name, key),
            });
        }

        info!(
            namespace = %self.name,
            entity = %key,
            sessions = entity.options().enable_sessions,
            "Entity created"
        );
        entities.insert(key, entity);
        Ok(())
    }

    /// Create a queue; names are unique across queues and topics
    pub fn add_queue(&self, name: &str, options: EntityOptions) -> Result<Arc<Queue>, BusError> {
        let name = EntityName::new(name)?;
        let queue = Arc::new(Queue::new(&self.name, name, options, self.clock.clone()));
        self.insert(Entity::Queue(Arc::clone(&queue)))?;
        Ok(queue)
    }

    /// Create a topic; names are unique across queues and topics
    pub fn add_topic(&self, name: &str, options: EntityOptions) -> Result<Arc<Topic>, BusError> {
        let name = EntityName::new(name)?;
        let topic = Arc::new(Topic::new(&self.name, name, options, self.clock.clone()));
        self.insert(Entity::Topic(Arc::clone(&topic)))?;
        Ok(topic)
    }

    /// Look up a queue or topic by name
    pub fn entity(&self, name: &str) -> Result<Entity, BusError> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::EntityNotFound {
                entity: format!("{}/{}", self.name, name),
            })
    }

    pub fn queue(&self, name: &str) -> Result<Arc<Queue>, BusError> {
        match self.entity(name)? {
            Entity::Queue(queue) => Ok(queue),
            Entity::Topic(_) => Err(BusError::EntityNotFound {
                entity: format!("{}/{} (a topic, not a queue)", self.name, name),
            }),
        }
    }

    pub fn topic(&self, name: &str) -> Result<Arc<Topic>, BusError> {
        match self.entity(name)? {
            Entity::Topic(topic) => Ok(topic),
            Entity::Queue(_) => Err(BusError::EntityNotFound {
                entity: format!("{}/{} (a queue, not a topic)", self.name, name),
            }),
        }
    }

    /// Names of all entities, sorted
    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
