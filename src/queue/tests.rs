//! Queue Module Tests
//!
//! Exercises the message state machine on a paused tokio clock so visibility
//! deadlines can be crossed deterministically with `tokio::time::advance`.
//!
//! ## Test Scopes
//! - **Claiming**: batch limits, FIFO order, invisibility of claimed messages.
//! - **Redelivery**: lapsed claims and explicit release.
//! - **Dead-lettering**: receive-count threshold, terminal failures, redrive.
//! - **Long polling**: wake-ups on enqueue and on lapsing claims.

#[cfg(test)]
mod tests {
    use crate::queue::error::QueueError;
    use crate::queue::queue::DurableQueue;
    use crate::queue::types::{MessageId, QueueConfig, QueueStats};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const VISIBILITY: Duration = Duration::from_secs(30);

    fn queue(max_receive_count: u32) -> DurableQueue {
        DurableQueue::new(
            "test-queue",
            QueueConfig {
                visibility_timeout: VISIBILITY,
                max_receive_count,
                capacity: None,
            },
        )
    }

    // ============================================================
    // TEST 1: Enqueue / Receive
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_receive_returns_enqueued_message() {
        let q = queue(3);
        let id = q.enqueue(json!({"value": "example.com"})).await.unwrap();

        let batch = q.receive(10).await;

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id(), &id);
        assert_eq!(batch[0].body()["value"], "example.com");
        assert_eq!(batch[0].message.receive_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claimed_message_is_invisible() {
        let q = queue(3);
        q.enqueue(json!(1)).await.unwrap();

        assert_eq!(q.receive(10).await.len(), 1);
        assert!(q.receive(10).await.is_empty(), "claimed message must stay hidden");

        assert_eq!(
            q.stats().await,
            QueueStats {
                visible: 0,
                in_flight: 1,
                dead_lettered: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_respects_batch_size_and_order() {
        let q = queue(3);
        for i in 0..5 {
            q.enqueue(json!(i)).await.unwrap();
        }

        let first = q.receive(3).await;
        let second = q.receive(3).await;

        let values: Vec<i64> = first
            .iter()
            .chain(second.iter())
            .map(|m| m.body().as_i64().unwrap())
            .collect();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_zero_batch_claims_nothing() {
        let q = queue(3);
        q.enqueue(json!(1)).await.unwrap();

        assert!(q.receive(0).await.is_empty());
        assert_eq!(q.stats().await.visible, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_rejects_when_full() {
        let q = DurableQueue::new(
            "small",
            QueueConfig {
                capacity: Some(1),
                ..QueueConfig::default()
            },
        );
        q.enqueue(json!(1)).await.unwrap();

        let err = q.enqueue(json!(2)).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(
            err,
            QueueError::Full {
                queue: "small".to_string(),
                capacity: 1
            }
        );
    }

    // ============================================================
    // TEST 2: Acknowledge
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_is_idempotent() {
        let q = queue(3);
        let id = q.enqueue(json!(1)).await.unwrap();
        q.receive(1).await;

        assert!(q.acknowledge(&id).await);
        assert!(!q.acknowledge(&id).await);
        assert!(!q.acknowledge(&MessageId::new()).await);
        assert!(q.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledged_message_is_never_redelivered() {
        let q = queue(3);
        let id = q.enqueue(json!(1)).await.unwrap();
        q.receive(1).await;
        q.acknowledge(&id).await;

        tokio::time::advance(VISIBILITY * 2).await;

        assert!(q.receive(10).await.is_empty());
    }

    // ============================================================
    // TEST 3: Redelivery
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_lapsed_claim_is_redelivered_with_incremented_count() {
        let q = queue(3);
        let id = q.enqueue(json!(1)).await.unwrap();

        let first = q.receive(1).await;
        assert_eq!(first[0].message.receive_count, 1);

        // Not yet lapsed.
        tokio::time::advance(VISIBILITY - Duration::from_secs(1)).await;
        assert!(q.receive(1).await.is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        let second = q.receive(1).await;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id(), &id);
        assert_eq!(second[0].message.receive_count, 2);
        assert!(first[0].is_claim_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_makes_message_visible_immediately() {
        let q = queue(3);
        let id = q.enqueue(json!(1)).await.unwrap();
        q.receive(1).await;

        q.release(&id).await.unwrap();

        let batch = q.receive(1).await;
        assert_eq!(batch.len(), 1);
        // One increment per receive; release itself adds nothing.
        assert_eq!(batch[0].message.receive_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_unknown_message_fails() {
        let q = queue(3);
        let err = q.release(&MessageId("nope".into())).await.unwrap_err();
        assert!(matches!(err, QueueError::UnknownMessage { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_visibility_postpones_redelivery() {
        let q = queue(3);
        let id = q.enqueue(json!(1)).await.unwrap();
        q.receive(1).await;

        tokio::time::advance(VISIBILITY - Duration::from_secs(5)).await;
        q.extend_visibility(&id, VISIBILITY).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(q.receive(1).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_visibility_of_visible_message_fails() {
        let q = queue(3);
        let id = q.enqueue(json!(1)).await.unwrap();

        assert!(q.extend_visibility(&id, VISIBILITY).await.is_err());
    }

    // ============================================================
    // TEST 4: Dead-lettering
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_message_dead_lettered_after_max_receive_count() {
        let max_receive_count = 3;
        let q = queue(max_receive_count);
        let id = q.enqueue(json!({"poison": true})).await.unwrap();

        for expected in 1..=max_receive_count {
            let batch = q.receive(1).await;
            assert_eq!(batch.len(), 1);
            assert_eq!(batch[0].message.receive_count, expected);
            tokio::time::advance(VISIBILITY).await;
        }

        // The (max_receive_count + 1)-th take moves it instead of returning it.
        assert!(q.receive(1).await.is_empty());

        let dead = q.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, id);
        assert_eq!(dead[0].receive_count, max_receive_count + 1);

        tokio::time::advance(VISIBILITY * 10).await;
        assert!(q.receive(10).await.is_empty());
        assert!(q.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_messages_still_count_towards_dead_letter() {
        let q = queue(2);
        let id = q.enqueue(json!(1)).await.unwrap();

        for _ in 0..2 {
            assert_eq!(q.receive(1).await.len(), 1);
            q.release(&id).await.unwrap();
        }

        assert!(q.receive(1).await.is_empty());
        assert_eq!(q.stats().await.dead_lettered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_lettering_does_not_block_other_messages() {
        let q = queue(1);
        q.enqueue(json!("poison")).await.unwrap();
        q.receive(1).await;
        tokio::time::advance(VISIBILITY).await;
        q.enqueue(json!("healthy")).await.unwrap();

        let batch = q.receive(10).await;

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body(), &json!("healthy"));
        assert_eq!(q.stats().await.dead_lettered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_moves_message_to_dead_letters() {
        let q = queue(3);
        let id = q.enqueue(json!(1)).await.unwrap();
        q.receive(1).await;

        q.fail(&id).await.unwrap();

        assert!(q.is_empty().await);
        assert_eq!(q.dead_letters().await[0].id, id);
        assert!(q.fail(&id).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_redrive_resets_receive_count() {
        let q = queue(1);
        q.enqueue(json!(1)).await.unwrap();
        q.receive(1).await;
        tokio::time::advance(VISIBILITY).await;
        q.receive(1).await;
        assert_eq!(q.stats().await.dead_lettered, 1);

        assert_eq!(q.redrive_dead_letters().await, 1);

        let batch = q.receive(1).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].message.receive_count, 1);
        assert_eq!(q.stats().await.dead_lettered, 0);
    }

    // ============================================================
    // TEST 5: Long polling
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_receive_wait_times_out_empty() {
        let q = queue(3);
        let started = tokio::time::Instant::now();

        let batch = q.receive_wait(10, Duration::from_secs(5)).await;

        assert!(batch.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_wait_wakes_on_enqueue() {
        let q = Arc::new(queue(3));
        let producer = q.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            producer.enqueue(json!("late")).await.unwrap();
        });

        let started = tokio::time::Instant::now();
        let batch = q.receive_wait(10, Duration::from_secs(20)).await;

        assert_eq!(batch.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_wait_wakes_when_claim_lapses() {
        let q = queue(3);
        q.enqueue(json!(1)).await.unwrap();
        q.receive(1).await;

        let batch = q.receive_wait(1, VISIBILITY * 2).await;

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].message.receive_count, 2);
    }
}
