//! Common test utilities for memory-bus integration tests
//!
//! This module provides:
//! - One-time tracing initialisation
//! - A test bus driven by a manual clock
//! - Shared message builders

use memory_bus::{
    BusProvider, EntityOptions, ManualClock, Message, Namespace, Queue, SessionId, Topic,
};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Lock duration used by every test entity
#[allow(dead_code)]
pub const LOCK_DURATION: Duration = Duration::from_secs(30);

static TRACING: Once = Once::new();

/// Install a test-writer subscriber, filtered by `RUST_LOG` (default `memory_bus=debug`)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "memory_bus=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

/// A provider with a single namespace, on a clock the test controls
pub struct TestBus {
    pub clock: ManualClock,
    pub provider: BusProvider,
    pub namespace: Arc<Namespace>,
}

impl TestBus {
    pub fn new() -> Self {
        init_tracing();

        let clock = ManualClock::starting_now();
        let provider = BusProvider::with_clock(Arc::new(clock.clone()));
        let namespace = provider
            .add_namespace(Some("test.bus.local"))
            .expect("namespace is created");

        Self {
            clock,
            provider,
            namespace,
        }
    }

    #[allow(dead_code)]
    pub fn queue(&self, name: &str) -> Arc<Queue> {
        self.namespace
            .add_queue(
                name,
                EntityOptions::default().with_lock_duration(LOCK_DURATION),
            )
            .expect("queue is created")
    }

    #[allow(dead_code)]
    pub fn session_queue(&self, name: &str) -> Arc<Queue> {
        self.namespace
            .add_queue(
                name,
                EntityOptions::with_sessions().with_lock_duration(LOCK_DURATION),
            )
            .expect("queue is created")
    }

    #[allow(dead_code)]
    pub fn topic(&self, name: &str, options: EntityOptions) -> Arc<Topic> {
        self.namespace
            .add_topic(name, options)
            .expect("topic is created")
    }

    /// Move the lock clock past the lock duration
    #[allow(dead_code)]
    pub fn expire_locks(&self) {
        self.clock.advance(LOCK_DURATION + Duration::from_secs(1));
    }
}

#[allow(dead_code)]
pub fn session_id(id: &str) -> SessionId {
    SessionId::new(id).expect("valid session id")
}

#[allow(dead_code)]
pub fn message(body: &str) -> Message {
    Message::new(body.to_string())
}

#[allow(dead_code)]
pub fn session_message(session: &str, body: &str) -> Message {
    message(body).with_session_id(session_id(session))
}
