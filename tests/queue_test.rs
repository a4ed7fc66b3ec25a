//! End-to-end queue behavior over the in-memory store: producer validation,
//! FIFO delivery, and waiting-set cleanup.

mod common;

use std::time::Duration;

use common::{RecordingHandler, spawn_worker, stop_worker, test_config};
use fairq::model::ClientId;
use fairq::producer::Producer;
use fairq::shutdown::Shutdown;
use fairq::store::{MemoryStore, Store};

// ---------------------------------------------------------------------------
// Producer boundary
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enqueue_rejects_zero_client_id() {
    let producer = Producer::new(MemoryStore::new());
    let result = producer.enqueue(0, vec!["m".into()]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn enqueue_rejects_empty_batch() {
    let producer = Producer::new(MemoryStore::new());
    let result = producer.enqueue(1, vec![]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn enqueue_registers_client_as_waiting() {
    let store = MemoryStore::new();
    let producer = Producer::new(store.clone());

    producer.enqueue(3, vec!["m".into()]).await.unwrap();

    assert_eq!(store.waiting_clients().await, vec![3]);
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_tasks_are_delivered_in_fifo_order() {
    let store = MemoryStore::new();
    let producer = Producer::new(store.clone());
    let handler = RecordingHandler::new();
    let shutdown = Shutdown::new();

    producer
        .enqueue(7, vec!["1".into(), "2".into(), "3".into()])
        .await
        .unwrap();

    let handle = spawn_worker(store.clone(), handler.clone(), test_config(), shutdown.clone());
    handler.wait_for(3, Duration::from_secs(5)).await;
    stop_worker(&shutdown, handle).await;

    assert_eq!(
        handler.deliveries(),
        vec![
            (7, "1".to_string()),
            (7, "2".to_string()),
            (7, "3".to_string())
        ]
    );

    // Fully drained client leaves the waiting set, the lock, and all slots.
    let client = ClientId::new(7).unwrap();
    assert!(store.waiting_clients().await.is_empty());
    assert!(!store.lock_held(client).await);
    assert!(store.queue_depths(client).await.unwrap().is_idle());
}

#[tokio::test]
async fn batches_across_clients_are_all_delivered() {
    let store = MemoryStore::new();
    let producer = Producer::new(store.clone());
    let handler = RecordingHandler::new();
    let shutdown = Shutdown::new();

    for client_id in 1..=5 {
        producer
            .enqueue(client_id, vec!["a".into(), "b".into()])
            .await
            .unwrap();
    }

    let handle = spawn_worker(store.clone(), handler.clone(), test_config(), shutdown.clone());
    handler.wait_for(10, Duration::from_secs(5)).await;
    stop_worker(&shutdown, handle).await;

    // Within each client the order is preserved even though clients
    // interleave arbitrarily.
    let deliveries = handler.deliveries();
    for client_id in 1..=5 {
        let messages: Vec<&str> = deliveries
            .iter()
            .filter(|(c, _)| *c == client_id)
            .map(|(_, m)| m.as_str())
            .collect();
        assert_eq!(messages, vec!["a", "b"], "client {client_id}");
    }
}

#[tokio::test]
async fn tasks_enqueued_mid_drain_arrive_on_a_later_cycle() {
    let store = MemoryStore::new();
    let producer = Producer::new(store.clone());
    let handler = RecordingHandler::new();
    let shutdown = Shutdown::new();

    producer.enqueue(2, vec!["first".into()]).await.unwrap();

    let handle = spawn_worker(store.clone(), handler.clone(), test_config(), shutdown.clone());
    handler.wait_for(1, Duration::from_secs(5)).await;

    // The worker re-adds the client via the waiting set on the second batch.
    producer.enqueue(2, vec!["second".into()]).await.unwrap();
    handler.wait_for(2, Duration::from_secs(5)).await;
    stop_worker(&shutdown, handle).await;

    assert_eq!(
        handler.deliveries(),
        vec![(2, "first".to_string()), (2, "second".to_string())]
    );
}
