//! Tests for queues, topics and subscriptions.

use super::*;
use crate::clock::ManualClock;
use crate::message::{ReceiveMode, SessionId};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn namespace_name() -> EntityName {
    EntityName::new("ns").unwrap()
}

fn topic(options: EntityOptions) -> Topic {
    Topic::new(
        &namespace_name(),
        EntityName::new("events").unwrap(),
        options,
        Arc::new(ManualClock::starting_now()),
    )
}

mod queue {
    use super::*;

    /// Verify queue paths and message counting.
    #[test]
    fn test_queue_counts() {
        let queue = Queue::new(
            &namespace_name(),
            EntityName::new("jobs").unwrap(),
            EntityOptions::default(),
            Arc::new(ManualClock::starting_now()),
        );

        queue
            .add_messages(vec![Message::new("a"), Message::new("b")])
            .unwrap();

        assert_eq!(queue.path(), "ns/jobs");
        assert_eq!(queue.message_count(), 2);
        assert_eq!(queue.active_message_count(), 2);
    }
}

mod topic {
    use super::*;

    /// Verify that every subscription receives its own copy.
    #[tokio::test]
    async fn test_fan_out_to_all_subscriptions() {
        let topic = topic(EntityOptions::default());
        let audit = topic.add_subscription("audit").unwrap();
        let billing = topic.add_subscription("billing").unwrap();

        topic.add_message(Message::new("order-created")).unwrap();

        let cancellation = CancellationToken::new();
        let from_audit = audit
            .store()
            .as_plain()
            .unwrap()
            .receive(1, Duration::ZERO, ReceiveMode::ReceiveAndDelete, &cancellation)
            .await
            .unwrap();
        assert_eq!(from_audit[0].body.as_ref(), b"order-created");
        assert_eq!(audit.message_count(), 0);
        assert_eq!(billing.message_count(), 1);
    }

    /// Verify that a topic without subscriptions silently drops messages.
    #[test]
    fn test_no_subscriptions_drops_messages() {
        let topic = topic(EntityOptions::default());
        topic.add_message(Message::new("lost")).unwrap();

        let late = topic.add_subscription("late").unwrap();
        assert_eq!(late.message_count(), 0);
    }

    /// Verify that a batch sent before any subscription exists is dropped.
    #[test]
    fn test_no_subscriptions_drops_batch() {
        let topic = topic(EntityOptions::with_sessions());
        let session = SessionId::new("s").unwrap();
        topic
            .add_messages(vec![
                Message::new("1").with_session_id(session.clone()),
                Message::new("2").with_session_id(session),
            ])
            .unwrap();

        let late = topic.add_subscription("late").unwrap();
        assert_eq!(late.message_count(), 0);
    }

    /// Verify that subscriptions inherit the topic's options.
    #[test]
    fn test_subscriptions_inherit_options() {
        let topic = topic(EntityOptions::with_sessions());
        let subscription = topic.add_subscription("per-order").unwrap();

        assert!(subscription.store().sessions_enabled());
        assert_eq!(subscription.topic_name().as_str(), "events");
        assert_eq!(subscription.path(), "ns/events/subscriptions/per-order");
    }

    /// Verify subscription registration errors.
    #[test]
    fn test_subscription_registry() {
        let topic = topic(EntityOptions::default());
        topic.add_subscription("audit").unwrap();

        assert!(matches!(
            topic.add_subscription("audit"),
            Err(BusError::EntityAlreadyExists { .. })
        ));
        assert!(matches!(
            topic.subscription("missing"),
            Err(BusError::EntityNotFound { .. })
        ));
        assert!(topic.subscription("audit").is_ok());
        assert!(topic.add_subscription("").is_err());
    }

    /// Verify that a message every subscription would reject is not delivered.
    #[test]
    fn test_rejected_fan_out() {
        let topic = topic(EntityOptions::with_sessions());
        let first = topic.add_subscription("first").unwrap();
        let second = topic.add_subscription("second").unwrap();

        assert!(topic.add_message(Message::new("no-session")).is_err());
        assert_eq!(first.message_count(), 0);

        let session = SessionId::new("s").unwrap();
        topic
            .add_message(Message::new("ok").with_session_id(session))
            .unwrap();
        assert_eq!(first.message_count(), 1);
        assert_eq!(second.message_count(), 1);
    }

    /// Verify that batches are copied to each subscription.
    #[test]
    fn test_batch_fan_out() {
        let topic = topic(EntityOptions::default());
        let audit = topic.add_subscription("audit").unwrap();
        let billing = topic.add_subscription("billing").unwrap();

        topic
            .add_messages(vec![Message::new("1"), Message::new("2")])
            .unwrap();

        assert_eq!(audit.message_count(), 2);
        assert_eq!(billing.message_count(), 2);
    }
}

mod entity {
    use super::*;

    /// Verify that the generic handle dispatches by kind.
    #[test]
    fn test_entity_dispatch() {
        let topic = Arc::new(topic(EntityOptions::default()));
        let subscription = topic.add_subscription("all").unwrap();
        let entity = Entity::Topic(Arc::clone(&topic));

        assert_eq!(entity.name().as_str(), "events");
        assert!(!entity.options().enable_sessions);
        entity.add_message(Message::new("x")).unwrap();

        assert_eq!(subscription.message_count(), 1);
    }
}

mod wait_until_empty {
    use super::*;

    fn jobs_queue() -> Arc<Queue> {
        Arc::new(Queue::new(
            &namespace_name(),
            EntityName::new("jobs").unwrap(),
            EntityOptions::default(),
            Arc::new(ManualClock::starting_now()),
        ))
    }

    /// Verify that an empty queue is reported empty without waiting.
    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_returns_at_once() {
        let queue = jobs_queue();
        let started = Instant::now();

        queue.wait_until_empty(Duration::from_secs(5)).await.unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    /// Verify that waiting ends once the last message is completed.
    #[tokio::test(start_paused = true)]
    async fn test_returns_when_drained() {
        let queue = jobs_queue();
        queue.add_message(Message::new("work")).unwrap();
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let store = queue.store().as_plain().unwrap();
                let received = store
                    .receive(1, Duration::ZERO, ReceiveMode::PeekLock, &CancellationToken::new())
                    .await
                    .unwrap();
                store
                    .complete_message(received[0].lock_token().unwrap())
                    .unwrap();
            })
        };
        let started = Instant::now();

        queue.wait_until_empty(Duration::from_secs(5)).await.unwrap();
        consumer.await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    /// Verify that locked messages still count as not drained.
    #[tokio::test(start_paused = true)]
    async fn test_locked_messages_keep_queue_non_empty() {
        let queue = jobs_queue();
        queue.add_message(Message::new("held")).unwrap();
        queue
            .store()
            .as_plain()
            .unwrap()
            .receive(1, Duration::ZERO, ReceiveMode::PeekLock, &CancellationToken::new())
            .await
            .unwrap();

        let result = queue.wait_until_empty(Duration::from_secs(2)).await;

        assert!(matches!(
            result,
            Err(BusError::NotEmpty {
                message_count: 1,
                ..
            })
        ));
    }

    /// Verify that subscriptions can be awaited independently.
    #[tokio::test(start_paused = true)]
    async fn test_subscription_wait() {
        let topic = topic(EntityOptions::default());
        let audit = topic.add_subscription("audit").unwrap();
        let billing = topic.add_subscription("billing").unwrap();
        topic.add_message(Message::new("event")).unwrap();

        audit
            .store()
            .as_plain()
            .unwrap()
            .receive(1, Duration::ZERO, ReceiveMode::ReceiveAndDelete, &CancellationToken::new())
            .await
            .unwrap();

        audit.wait_until_empty(Duration::ZERO).await.unwrap();
        let error = billing
            .wait_until_empty(Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Entity ns/events/subscriptions/billing still holds 1 message(s)"
        );
    }
}
