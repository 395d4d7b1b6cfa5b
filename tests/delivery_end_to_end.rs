#![cfg(not(target_arch = "wasm32"))]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use observability_client::client::{DeliveryClient, DeliveryOutcome, SendOptions};
use observability_client::config::{merge_config, ObservabilityOptions};
use observability_client::persistence::{FileStorage, InMemoryStorage, KeyValueStorage};
use observability_client::queue::{QueueItemKind, QUEUE_STORAGE_KEY};
use observability_client::tracking::{EnvironmentInfo, Tracker, DEFAULT_EVENT_CATEGORY};
use serde_json::json;

fn unique_dir(name: &str) -> PathBuf {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    std::env::temp_dir().join(format!(
        "observability-e2e-{name}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ))
}

fn client_for(service_url: &str, options: ObservabilityOptions, local: Arc<dyn KeyValueStorage>) -> DeliveryClient {
    let config = merge_config(&ObservabilityOptions {
        service_url: Some(service_url.to_string()),
        timeout_ms: Some(2_000),
        ..options
    });
    DeliveryClient::builder(config)
        .local_storage(local)
        .session_storage(Arc::new(InMemoryStorage::new()))
        .backoff_unit(Duration::ZERO)
        .build()
}

#[tokio::test(flavor = "current_thread")]
async fn unreachable_collector_enqueues_exactly_one_event() {
    let client = client_for(
        "http://127.0.0.1:9",
        ObservabilityOptions::default(),
        Arc::new(InMemoryStorage::new()),
    );

    let outcome = client
        .send("/events", json!({"event_type": "x"}), SendOptions::immediate())
        .await;

    assert!(matches!(outcome, DeliveryOutcome::Queued { .. }));
    let items = client.queue().snapshot().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, QueueItemKind::Event);
    assert_eq!(items[0].retry_count, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn queued_payload_survives_restart_and_is_delivered_once() {
    let dir = unique_dir("restart");
    let body = json!({
        "user_id": null,
        "session_id": "session_1_abc",
        "event_type": "checkout",
        "event_category": "user_action",
        "event_metadata": {"cart": [1, 2, 3]},
        "user_agent": "e2e",
        "service_name": "shop"
    });

    {
        let storage = Arc::new(FileStorage::new(dir.clone()).unwrap());
        let offline = client_for("http://127.0.0.1:9", ObservabilityOptions::default(), storage);
        let outcome = offline
            .send("/events", body.clone(), SendOptions::immediate())
            .await;
        assert!(outcome.queued_item_id().is_some());
    }

    let server = MockServer::start();
    let collector = server.mock(|when, then| {
        when.method(POST).path("/events").json_body(body.clone());
        then.status(201);
    });

    let storage = Arc::new(FileStorage::new(dir.clone()).unwrap());
    let online = client_for(&server.base_url(), ObservabilityOptions::default(), storage.clone());
    assert_eq!(online.queue().len().await, 1);

    let report = online.drain_queue().await;
    assert_eq!(report.delivered().len(), 1);
    assert!(online.queue().is_empty().await);
    assert_eq!(storage.get(QUEUE_STORAGE_KEY).unwrap().as_deref(), Some("[]"));

    online.drain_queue().await;
    collector.assert_hits(1);
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test(flavor = "current_thread")]
async fn batch_flushes_at_size_then_on_timer() {
    let server = MockServer::start();
    let events = server.mock(|when, then| {
        when.method(POST).path("/events");
        then.status(200);
    });

    let client = client_for(
        &server.base_url(),
        ObservabilityOptions {
            batch_size: Some(10),
            batch_interval: Some(1_000),
            ..Default::default()
        },
        Arc::new(InMemoryStorage::new()),
    );
    let tracker = Tracker::with_environment(client.clone(), EnvironmentInfo::default());
    client.start();

    for n in 0..12 {
        let outcome = tracker
            .track_event(&format!("event_{n}"), DEFAULT_EVENT_CATEGORY, json!({}))
            .await;
        assert_eq!(outcome, DeliveryOutcome::Buffered);
    }
    assert_eq!(client.buffered_len().await, 2);
    for _ in 0..40 {
        if events.hits() >= 10 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(events.hits(), 10);
    assert_eq!(client.buffered_len().await, 2);

    for _ in 0..120 {
        if events.hits() == 12 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(events.hits(), 12);
    client.shutdown().await;
}

#[tokio::test(flavor = "current_thread")]
async fn server_errors_are_queued_and_retried_until_success() {
    let server = MockServer::start();
    let mut failing = server.mock(|when, then| {
        when.method(POST).path("/errors/ui");
        then.status(503);
    });

    let client = client_for(
        &server.base_url(),
        ObservabilityOptions::default(),
        Arc::new(InMemoryStorage::new()),
    );
    let outcome = client
        .send("/errors/ui", json!({"error_message": "boom"}), SendOptions::immediate())
        .await;
    assert!(outcome.queued_item_id().is_some());

    let report = client.drain_queue().await;
    assert_eq!(report.retrying().len(), 1);
    assert_eq!(client.queue().snapshot().await[0].retry_count, 1);

    failing.delete();
    let recovered = server.mock(|when, then| {
        when.method(POST).path("/errors/ui");
        then.status(200);
    });
    let report = client.drain_queue().await;
    assert_eq!(report.delivered().len(), 1);
    recovered.assert_hits(1);
    assert!(client.queue().is_empty().await);
}

#[tokio::test(flavor = "current_thread")]
async fn health_check_against_collector() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/health");
        then.status(200).body("{\"status\":\"healthy\"}");
    });
    let healthy = client_for(
        &server.base_url(),
        ObservabilityOptions::default(),
        Arc::new(InMemoryStorage::new()),
    );
    assert!(healthy.check_health().await);

    let down = client_for(
        "http://127.0.0.1:9",
        ObservabilityOptions::default(),
        Arc::new(InMemoryStorage::new()),
    );
    assert!(!down.check_health().await);
}

#[tokio::test(flavor = "current_thread")]
async fn clients_sharing_a_storage_directory_keep_each_others_items() {
    let dir = unique_dir("shared");
    let offline = |name: &str| {
        let storage = Arc::new(FileStorage::new(dir.clone()).unwrap());
        client_for(
            "http://127.0.0.1:9",
            ObservabilityOptions {
                service_name: Some(name.to_string()),
                ..Default::default()
            },
            storage,
        )
    };
    let first = offline("orders");
    let second = offline("orders");

    first
        .send("/events", json!({"event_type": "from_first"}), SendOptions::immediate())
        .await;
    second
        .send("/events", json!({"event_type": "from_second"}), SendOptions::immediate())
        .await;

    let raw = FileStorage::new(dir.clone())
        .unwrap()
        .get(QUEUE_STORAGE_KEY)
        .unwrap()
        .unwrap();
    assert!(raw.contains("from_first"));
    assert!(raw.contains("from_second"));
    assert_eq!(first.queue().len().await, 2);
    let _ = std::fs::remove_dir_all(dir);
}
