//! Error types for bus operations.

use thiserror::Error;

/// Reason a lock-scoped operation could not be carried out.
///
/// These are expected, recoverable outcomes: locks expire, and another
/// receiver may have been granted the lock since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockFailure {
    #[error("Session lock lost")]
    SessionLockLost,

    #[error("Message lock lost")]
    MessageLockLost,
}

/// Comprehensive error type for all bus operations
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Namespace not found: {namespace}")]
    NamespaceNotFound { namespace: String },

    #[error("Namespace already exists: {namespace}")]
    NamespaceAlreadyExists { namespace: String },

    #[error("Messaging entity not found: {entity}")]
    EntityNotFound { entity: String },

    #[error("Messaging entity already exists: {entity}")]
    EntityAlreadyExists { entity: String },

    #[error("Sessions are not enabled for entity {entity}")]
    SessionsNotEnabled { entity: String },

    #[error("Feature not supported by the in-memory bus: {feature}")]
    FeatureNotSupported { feature: String },

    #[error("Operation was cancelled by the caller")]
    Cancelled,

    #[error("Entity {entity} still holds {message_count} message(s)")]
    NotEmpty { entity: String, message_count: u64 },

    #[error(transparent)]
    LockLost(#[from] LockFailure),

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl BusError {
    /// The lock failure carried by this error, if any
    pub fn lock_failure(&self) -> Option<LockFailure> {
        match self {
            Self::LockLost(failure) => Some(*failure),
            _ => None,
        }
    }

    /// Check if a message or session lock was lost
    pub fn is_lock_lost(&self) -> bool {
        self.lock_failure().is_some()
    }

    /// Check if the caller cancelled the operation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors during message body serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
