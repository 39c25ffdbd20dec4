//! # Memory Bus
//!
//! In-process emulation of a Service Bus style message broker for tests.
//!
//! This library provides:
//! - Queues, topics and subscriptions grouped into namespaces
//! - Peek-lock delivery with lock expiry, renewal and redelivery
//! - Receive-and-delete delivery
//! - Sessions with exclusive locks and per-session state
//! - Blocking receives bounded by a timeout and interruptible by cancellation
//! - An injectable clock so lock expiry can be driven from tests
//!
//! ## Module Organization
//!
//! - [`error`] - Error types and lock failure outcomes
//! - [`message`] - Messages, received messages and identifiers
//! - [`clock`] - Time sources for lock expiry
//! - [`config`] - Entity options and topology configuration
//! - [`engine`] - Queue and session delivery engines
//! - [`store`] - Plain and session message stores
//! - [`sessions`] - Locked session handles
//! - [`entity`] - Queues, topics and subscriptions
//! - [`provider`] - Bus provider and namespaces
//!
//! ## Example
//!
//! ```rust
//! use memory_bus::{BusProvider, EntityOptions, Message, ReceiveMode};
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let provider = BusProvider::new();
//! let namespace = provider.add_namespace(None).unwrap();
//! let queue = namespace.add_queue("jobs", EntityOptions::default()).unwrap();
//!
//! queue.add_message(Message::new("hello")).unwrap();
//!
//! let store = queue.store().as_plain().unwrap();
//! let received = store
//!     .receive(10, Duration::ZERO, ReceiveMode::PeekLock, &CancellationToken::new())
//!     .await
//!     .unwrap();
//! store.complete_message(received[0].lock_token().unwrap()).unwrap();
//!
//! assert_eq!(queue.message_count(), 0);
//! # });
//! ```

// Module declarations
pub mod clock;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod message;
pub mod provider;
pub mod sessions;
pub mod store;

// Re-export commonly used types at crate root for convenience
pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use crate::config::{EntityOptions, TopologyConfig, DEFAULT_LOCK_DURATION};
pub use crate::engine::{QueueEngine, SessionEngine};
pub use crate::entity::{Entity, Queue, Subscription, Topic, EMPTY_POLL_INTERVAL};
pub use crate::error::{
    BusError, ConfigurationError, LockFailure, SerializationError, ValidationError,
};
pub use crate::message::{
    EntityName, LockToken, Message, MessageId, ReceiveMode, ReceivedMessage, SessionId,
    SessionLockToken, Timestamp,
};
pub use crate::provider::{BusProvider, Namespace};
pub use crate::sessions::{LockedSession, SessionResult};
pub use crate::store::{EntityStore, MessageStore, PlainMessageStore, SessionMessageStore};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
