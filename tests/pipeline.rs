//! End-to-end tests: store changes in, webhook calls out.

#![cfg(feature = "webhook")]

mod common;

use async_trait::async_trait;
use camhook::dispatch::NotificationSink;
use camhook::prelude::*;
use camhook::settings::BackoffPolicy;
use camhook::watch::WatcherExit;
use common::{ROOT, VALUE, WebhookServer, entry, wait_registered};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

fn settings(on_url: String, off_url: String) -> MonitorSettings {
    let mut settings = MonitorSettings {
        namespace_roots: vec![ROOT.to_string()],
        settle_delay_ms: 20,
        poll_interval_ms: 10,
        retry: BackoffPolicy {
            base_delay_ms: 5,
            max_delay_ms: 50,
        },
        ..MonitorSettings::default()
    };
    settings.webhook.on_url = Some(on_url);
    settings.webhook.off_url = Some(off_url);
    settings.webhook.timeout_ms = 2_000;
    settings
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_key(ROOT);
    store.set_value(&entry("A"), VALUE, 1);
    store.set_value(&entry("B"), VALUE, 1);
    store.set_value(&entry("Denied"), VALUE, 1);
    store.deny_access(&entry("Denied"));
    store
}

#[tokio::test]
async fn test_transitions_reach_the_right_webhook() {
    let mut server = WebhookServer::start(vec![200, 500, 200]).await;
    let store = seeded_store();
    let settings = settings(server.url("/on"), server.url("/off"));
    let sink = Arc::new(WebhookSink::from_settings(&settings.webhook).unwrap());

    let running = Monitor::new(Arc::new(store.clone()), sink, settings)
        .start()
        .await
        .unwrap();

    // The denied child gets no watcher.
    assert_eq!(
        running.entries(),
        &[EntryId::new(entry("A")), EntryId::new(entry("B"))]
    );
    assert_eq!(running.active_entries().len(), 2);

    // A turns on.
    wait_registered(&store, &entry("A")).await;
    store.set_value(&entry("A"), VALUE, 0);
    let request = server.next_request().await;
    assert_eq!(request.path, "/on");
    assert_eq!(
        request.body,
        serde_json::json!({
            "entry_id": entry("A"),
            "display_name": "A",
            "status": "on",
        })
    );

    // A turns off; the endpoint answers 500.
    wait_registered(&store, &entry("A")).await;
    store.set_value(&entry("A"), VALUE, 42);
    let request = server.next_request().await;
    assert_eq!(request.path, "/off");
    assert_eq!(request.body["status"], "off");

    // The failure did not stop the next event.
    wait_registered(&store, &entry("B")).await;
    store.set_value(&entry("B"), VALUE, 0);
    let request = server.next_request().await;
    assert_eq!(request.path, "/on");
    assert_eq!(request.body["entry_id"], entry("B"));

    let stats = running.stats();
    timeout(Duration::from_secs(5), async {
        while stats.snapshot().attempted() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let report = running.shutdown().await.unwrap();
    assert_eq!(report.dispatch.delivered, 2);
    assert_eq!(report.dispatch.failed, 1);
    assert_eq!(report.watcher_exits.len(), 2);
    assert!(
        report
            .watcher_exits
            .iter()
            .all(|(_, exit)| *exit == WatcherExit::Cancelled)
    );
    assert_eq!(store.total_live_registrations(), 0);
}

#[tokio::test]
async fn test_unreachable_webhook_is_logged_and_skipped() {
    let store = seeded_store();
    // Nothing listens on port 9 of localhost in the test environment.
    let settings = settings(
        "http://127.0.0.1:9/on".to_string(),
        "http://127.0.0.1:9/off".to_string(),
    );
    let sink = Arc::new(WebhookSink::from_settings(&settings.webhook).unwrap());
    let running = Monitor::new(Arc::new(store.clone()), sink, settings)
        .start()
        .await
        .unwrap();

    for value in [0, 7] {
        wait_registered(&store, &entry("A")).await;
        store.set_value(&entry("A"), VALUE, value);
    }

    let stats = running.stats();
    timeout(Duration::from_secs(10), async {
        while stats.snapshot().attempted() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let report = running.shutdown().await.unwrap();
    assert_eq!(report.dispatch.failed, 2);
    assert_eq!(report.dispatch.delivered, 0);
}

/// Sink that blocks every delivery until the test hands out permits.
struct GatedSink {
    gate: Semaphore,
    delivered: AtomicUsize,
}

#[async_trait]
impl NotificationSink for GatedSink {
    async fn deliver(&self, _event: &TransitionEvent) -> Result<()> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| MonitorError::Dispatch(e.to_string()))?;
        permit.forget();
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> String {
        "gated".to_string()
    }
}

#[tokio::test]
async fn test_stuck_dispatch_does_not_block_watchers() {
    let store = seeded_store();
    let sink = Arc::new(GatedSink {
        gate: Semaphore::new(0),
        delivered: AtomicUsize::new(0),
    });
    let settings = settings("http://unused/on".into(), "http://unused/off".into());
    let running = Monitor::new(Arc::new(store.clone()), sink.clone(), settings)
        .start()
        .await
        .unwrap();

    // With the dispatcher stuck on the first event, the watcher keeps cycling:
    // each firing is read, published and followed by a fresh registration.
    for value in [0, 3, 0, 3] {
        wait_registered(&store, &entry("A")).await;
        store.set_value(&entry("A"), VALUE, value);
    }
    wait_registered(&store, &entry("A")).await;
    assert_eq!(sink.delivered.load(Ordering::SeqCst), 0);

    sink.gate.add_permits(4);
    let report = timeout(Duration::from_secs(10), running.shutdown())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.dispatch.delivered, 4);
    assert_eq!(sink.delivered.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_run_until_stops_on_shutdown_signal() {
    let store = seeded_store();
    let sink = Arc::new(GatedSink {
        gate: Semaphore::new(10),
        delivered: AtomicUsize::new(0),
    });
    let settings = settings("http://unused/on".into(), "http://unused/off".into());

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let monitor = tokio::spawn(
        Monitor::new(Arc::new(store.clone()), sink.clone(), settings).run_until(async {
            let _ = stop_rx.await;
        }),
    );

    wait_registered(&store, &entry("B")).await;
    store.remove_key(&entry("B"));
    wait_registered(&store, &entry("A")).await;
    store.set_value(&entry("A"), VALUE, 0);

    timeout(Duration::from_secs(5), async {
        while sink.delivered.load(Ordering::SeqCst) < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    stop_tx.send(()).unwrap();
    let report = timeout(Duration::from_secs(5), monitor)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(report.entries.len(), 2);
    assert!(
        report
            .watcher_exits
            .contains(&(EntryId::new(entry("B")), WatcherExit::EntryRemoved))
    );
    assert!(
        report
            .watcher_exits
            .contains(&(EntryId::new(entry("A")), WatcherExit::Cancelled))
    );
    assert_eq!(report.dispatch.delivered, 1);
    assert_eq!(store.total_live_registrations(), 0);
}

#[cfg(feature = "metrics")]
#[tokio::test]
async fn test_monitor_records_metrics() {
    use camhook::metrics::MonitorMetrics;
    use opentelemetry::global;

    let store = seeded_store();
    let sink = Arc::new(GatedSink {
        gate: Semaphore::new(10),
        delivered: AtomicUsize::new(0),
    });
    let settings = settings("http://unused/on".into(), "http://unused/off".into());
    let running = Monitor::new(Arc::new(store.clone()), sink.clone(), settings)
        .with_metrics(MonitorMetrics::new(global::meter("camhook-test")))
        .start()
        .await
        .unwrap();

    wait_registered(&store, &entry("A")).await;
    store.set_value(&entry("A"), VALUE, 0);
    timeout(Duration::from_secs(5), async {
        while sink.delivered.load(Ordering::SeqCst) < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let report = running.shutdown().await.unwrap();
    assert_eq!(report.dispatch.delivered, 1);
    assert_eq!(report.watcher_exits.len(), 2);
}
