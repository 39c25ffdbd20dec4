//! Entity options and namespace topology configuration.
//!
//! Entities receive their [`EntityOptions`] at creation. A whole topology of
//! namespaces, queues, topics and subscriptions can also be described in a
//! configuration file and materialised with
//! [`BusProvider::from_topology`](crate::provider::BusProvider::from_topology).

use crate::error::ConfigurationError;
use crate::message::EntityName;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Lock duration used when an entity does not configure one
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(30);

/// Prefix for environment variable overrides, e.g.
/// `MEMORY_BUS__DEFAULT_LOCK_DURATION_SECONDS=10`
pub const ENV_PREFIX: &str = "MEMORY_BUS";

/// Behaviour of a queue or topic, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityOptions {
    /// How long a peek-lock or session lock stays valid without renewal
    pub lock_duration: Duration,
    /// Whether messages must carry a session ID and be consumed per session
    pub enable_sessions: bool,
}

impl EntityOptions {
    /// Options with sessions enabled
    pub fn with_sessions() -> Self {
        Self {
            enable_sessions: true,
            ..Self::default()
        }
    }

    /// Override the lock duration
    pub fn with_lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration = lock_duration;
        self
    }
}

impl Default for EntityOptions {
    fn default() -> Self {
        Self {
            lock_duration: DEFAULT_LOCK_DURATION,
            enable_sessions: false,
        }
    }
}

/// Declarative description of every namespace and entity to create
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Lock duration for entities that do not set their own
    #[serde(default)]
    pub default_lock_duration_seconds: Option<u64>,
    #[serde(default)]
    pub namespaces: Vec<NamespaceConfig>,
}

/// One namespace and its entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub name: String,
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
}

/// Queue definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    #[serde(default)]
    pub lock_duration_seconds: Option<u64>,
    #[serde(default)]
    pub enable_sessions: bool,
}

/// Topic definition; subscriptions inherit the topic's options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    #[serde(default)]
    pub lock_duration_seconds: Option<u64>,
    #[serde(default)]
    pub enable_sessions: bool,
    #[serde(default)]
    pub subscriptions: Vec<String>,
}

impl TopologyConfig {
    /// Load a topology file, layering `MEMORY_BUS__*` environment overrides.
    ///
    /// The file format is inferred from the extension (YAML, TOML or JSON).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigurationError::Missing {
                key: path.display().to_string(),
            });
        }

        let source = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        Self::from_source(source)
    }

    /// Parse a YAML document
    pub fn from_yaml(content: &str) -> Result<Self, ConfigurationError> {
        let source = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Yaml))
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        Self::from_source(source)
    }

    fn from_source(source: config::Config) -> Result<Self, ConfigurationError> {
        let topology: Self =
            source
                .try_deserialize()
                .map_err(|e| ConfigurationError::Parsing {
                    message: e.to_string(),
                })?;

        topology.validate()?;
        Ok(topology)
    }

    /// Check names and durations before anything is created
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.default_lock_duration_seconds == Some(0) {
            return Err(invalid("default_lock_duration_seconds must be positive"));
        }

        let mut namespaces = HashSet::new();
        for namespace in &self.namespaces {
            check_name(&namespace.name)?;
            if !namespaces.insert(namespace.name.as_str()) {
                return Err(invalid(format!(
                    "namespace '{}' is defined more than once",
                    namespace.name
                )));
            }

            let mut entities = HashSet::new();
            let definitions = namespace
                .queues
                .iter()
                .map(|q| (&q.name, q.lock_duration_seconds))
                .chain(
                    namespace
                        .topics
                        .iter()
                        .map(|t| (&t.name, t.lock_duration_seconds)),
                );

            for (name, lock_duration_seconds) in definitions {
                check_name(name)?;
                if lock_duration_seconds == Some(0) {
                    return Err(invalid(format!(
                        "lock duration of '{}/{}' must be positive",
                        namespace.name, name
                    )));
                }
                if !entities.insert(name.as_str()) {
                    return Err(invalid(format!(
                        "entity '{}' is defined more than once in namespace '{}'",
                        name, namespace.name
                    )));
                }
            }

            for topic in &namespace.topics {
                let mut subscriptions = HashSet::new();
                for subscription in &topic.subscriptions {
                    check_name(subscription)?;
                    if !subscriptions.insert(subscription.as_str()) {
                        return Err(invalid(format!(
                            "subscription '{}' is defined more than once on topic '{}'",
                            subscription, topic.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn lock_duration(&self, seconds: Option<u64>) -> Duration {
        seconds
            .or(self.default_lock_duration_seconds)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LOCK_DURATION)
    }

    /// Effective options for a queue
    pub fn queue_options(&self, queue: &QueueConfig) -> EntityOptions {
        EntityOptions {
            lock_duration: self.lock_duration(queue.lock_duration_seconds),
            enable_sessions: queue.enable_sessions,
        }
    }

    /// Effective options for a topic and its subscriptions
    pub fn topic_options(&self, topic: &TopicConfig) -> EntityOptions {
        EntityOptions {
            lock_duration: self.lock_duration(topic.lock_duration_seconds),
            enable_sessions: topic.enable_sessions,
        }
    }
}

fn check_name(name: &str) -> Result<(), ConfigurationError> {
    EntityName::new(name)
        .map(|_| ())
        .map_err(|e| invalid(format!("'{}': {}", name, e)))
}

fn invalid(message: impl Into<String>) -> ConfigurationError {
    ConfigurationError::Invalid {
        message: message.into(),
    }
}
