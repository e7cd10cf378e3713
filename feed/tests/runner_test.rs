use std::sync::Arc;
use std::time::Duration;

use corelib::Signal;
use feed::{ConnectionState, SyncConfig, SyncError, SyncEvent, SyncHandle, SyncRunner, Visibility};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use mock_api::{MockAlerts, MockApi, MockConnector, payload, snapshot, ts};

struct Harness {
    api: Arc<MockApi>,
    connector: Arc<MockConnector>,
    alerts: Arc<MockAlerts>,
    visibility: watch::Sender<Visibility>,
    handle: SyncHandle,
    events: broadcast::Receiver<SyncEvent>,
    task: JoinHandle<()>,
}

fn harness(poll_interval: Duration, alerts: MockAlerts) -> Harness {
    let config = SyncConfig {
        reconnect_delay: Duration::from_secs(3),
        poll_interval,
        analytics_interval: Duration::from_secs(30),
        ..SyncConfig::default()
    };

    let api = Arc::new(MockApi::default());
    let connector = Arc::new(MockConnector::default());
    let alerts = Arc::new(alerts);
    let (visibility, visibility_rx) = watch::channel(Visibility::Visible);

    let (runner, handle) = SyncRunner::new(
        &config,
        api.clone(),
        connector.clone(),
        alerts.clone(),
        visibility_rx,
    );
    let events = handle.subscribe();
    let task = runner.spawn();

    Harness {
        api,
        connector,
        alerts,
        visibility,
        handle,
        events,
        task,
    }
}

/// Push-focused harness: polling effectively off.
fn push_harness() -> Harness {
    harness(Duration::from_secs(3_600), MockAlerts::default())
}

async fn wait_for(
    events: &mut broadcast::Receiver<SyncEvent>,
    want: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    timeout(Duration::from_secs(600), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if want(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn is_state(state: ConnectionState) -> impl Fn(&SyncEvent) -> bool {
    move |e| *e == SyncEvent::Connection(state)
}

fn is_alert(signal: Signal) -> impl Fn(&SyncEvent) -> bool {
    move |e| matches!(e, SyncEvent::AlertSent { signal: s, .. } if *s == signal)
}

fn is_snapshot_at(secs: i64) -> impl Fn(&SyncEvent) -> bool {
    move |e| matches!(e, SyncEvent::Snapshot { snapshot, .. } if snapshot.timestamp == ts(secs))
}

#[tokio::test(start_paused = true)]
async fn push_snapshots_are_published_and_alerted_once() {
    let mut h = push_harness();
    let feed = h.connector.accept();

    h.handle.start().await.unwrap();
    wait_for(&mut h.events, is_state(ConnectionState::Connected)).await;
    assert_eq!(h.handle.connection_state(), ConnectionState::Connected);

    feed.unbounded_send(Ok(payload(Signal::Buy, 1, 100.0))).unwrap();
    wait_for(&mut h.events, is_alert(Signal::Buy)).await;

    feed.unbounded_send(Ok(payload(Signal::Buy, 2, 101.0))).unwrap();
    let event = wait_for(&mut h.events, is_snapshot_at(2)).await;
    let SyncEvent::Snapshot { change, .. } = event else {
        unreachable!()
    };
    let change = change.unwrap();
    assert!((change.magnitude_pct - 1.0).abs() < 1e-9);
    assert!(change.is_up());

    feed.unbounded_send(Ok(payload(Signal::Sell, 3, 99.0))).unwrap();
    wait_for(&mut h.events, is_alert(Signal::Sell)).await;

    assert_eq!(h.alerts.signals(), vec![Signal::Buy, Signal::Sell]);
    assert_eq!(h.handle.latest().map(|s| s.timestamp), Some(ts(3)));
    assert_eq!(h.connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_falls_back_to_pull_then_reconnects() {
    let mut h = push_harness();
    let feed = h.connector.accept();
    let _second = h.connector.accept();

    h.handle.start().await.unwrap();
    wait_for(&mut h.events, is_state(ConnectionState::Connected)).await;

    feed.unbounded_send(Ok(payload(Signal::Buy, 1, 100.0))).unwrap();
    wait_for(&mut h.events, is_alert(Signal::Buy)).await;

    // Channel dies; the one-shot pull still sees BUY.
    h.api.push_signal(snapshot(Signal::Buy, 2, 100.5));
    feed.unbounded_send(Err(adapters::signal::SignalApiError::MalformedPayload(
        "connection reset".into(),
    )))
    .unwrap();

    wait_for(&mut h.events, |e| *e == SyncEvent::Fallback(true)).await;
    wait_for(&mut h.events, is_snapshot_at(2)).await;

    // Manual refresh while still down brings SELL.
    h.api.push_signal(snapshot(Signal::Sell, 3, 98.0));
    h.handle.refresh().await.unwrap();
    wait_for(&mut h.events, is_alert(Signal::Sell)).await;

    assert_eq!(h.alerts.signals(), vec![Signal::Buy, Signal::Sell]);

    // After the fixed delay the channel comes back.
    wait_for(&mut h.events, is_state(ConnectionState::Connected)).await;
    assert_eq!(h.connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn refused_connection_is_retried_after_fixed_delay() {
    let mut h = push_harness();
    h.connector.refuse();
    let _feed = h.connector.accept();

    h.handle.start().await.unwrap();
    wait_for(&mut h.events, is_state(ConnectionState::Disconnected)).await;

    let started = tokio::time::Instant::now();
    wait_for(&mut h.events, is_state(ConnectionState::Connected)).await;

    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(h.connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn hidden_host_suspends_until_visible_again() {
    let mut h = push_harness();
    let _feed = h.connector.accept();

    h.handle.start().await.unwrap();
    wait_for(&mut h.events, is_state(ConnectionState::Connected)).await;

    h.visibility.send(Visibility::Hidden).unwrap();
    wait_for(&mut h.events, is_state(ConnectionState::Suspended)).await;

    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.attempts(), 1);

    let _resumed = h.connector.accept();
    h.visibility.send(Visibility::Visible).unwrap();
    wait_for(&mut h.events, is_state(ConnectionState::Connected)).await;

    assert_eq!(h.connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn polls_while_channel_is_down() {
    // Nothing scripted: the connect attempt never completes.
    let mut h = harness(Duration::from_secs(30), MockAlerts::default());
    h.api.push_signal(snapshot(Signal::Hold, 1, 100.0));

    h.handle.start().await.unwrap();
    wait_for(&mut h.events, is_snapshot_at(1)).await;

    assert_eq!(h.api.signal_calls(), 1);
    assert_eq!(h.handle.latest().map(|s| s.signal), Some(Signal::Hold));
}

#[tokio::test(start_paused = true)]
async fn analytics_are_pulled_on_start_and_on_their_cadence() {
    let mut h = push_harness();
    let _feed = h.connector.accept();

    h.handle.start().await.unwrap();
    wait_for(&mut h.events, |e| matches!(e, SyncEvent::Performance(_))).await;
    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.api.history_calls(), 2);
    assert_eq!(h.api.performance_calls(), 1);
    assert_eq!(h.api.advanced_calls(), 1);

    // Three ticks: advanced only.
    sleep(Duration::from_secs(90)).await;
    assert_eq!(h.api.advanced_calls(), 4);
    assert_eq!(h.api.performance_calls(), 1);

    // Fourth tick also refreshes the reports.
    sleep(Duration::from_secs(30)).await;
    assert_eq!(h.api.advanced_calls(), 5);
    assert_eq!(h.api.performance_calls(), 2);

    // Analytics never pull the signal itself while push is live.
    assert_eq!(h.api.signal_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_discards_pull_still_in_flight() {
    let mut h = push_harness();
    h.api.set_delay(Duration::from_secs(5));
    h.api.push_signal(snapshot(Signal::Buy, 1, 100.0));

    h.handle.start().await.unwrap();
    h.handle.refresh().await.unwrap();
    h.handle.stop().await.unwrap();
    wait_for(&mut h.events, is_state(ConnectionState::Disconnected)).await;

    sleep(Duration::from_secs(10)).await;

    while let Ok(event) = h.events.try_recv() {
        assert!(
            !matches!(event, SyncEvent::Snapshot { .. }),
            "late pull must not publish"
        );
    }
    assert!(h.handle.latest().is_none());
    assert!(h.alerts.signals().is_empty());
}

#[tokio::test(start_paused = true)]
async fn manual_alert_needs_a_snapshot() {
    let mut h = push_harness();

    assert!(matches!(
        h.handle.send_alert().await,
        Err(SyncError::NoSnapshot)
    ));

    let feed = h.connector.accept();
    h.handle.start().await.unwrap();
    wait_for(&mut h.events, is_state(ConnectionState::Connected)).await;
    feed.unbounded_send(Ok(payload(Signal::Hold, 1, 100.0))).unwrap();
    wait_for(&mut h.events, is_snapshot_at(1)).await;

    let receipt = h.handle.send_alert().await.unwrap();

    assert!(receipt.success);
    assert_eq!(h.alerts.signals(), vec![Signal::Hold]);
}

#[tokio::test(start_paused = true)]
async fn manual_alert_reports_service_refusal() {
    let mut h = harness(Duration::from_secs(3_600), MockAlerts::failing());
    let feed = h.connector.accept();

    h.handle.start().await.unwrap();
    wait_for(&mut h.events, is_state(ConnectionState::Connected)).await;
    feed.unbounded_send(Ok(payload(Signal::Wait, 1, 100.0))).unwrap();
    wait_for(&mut h.events, is_snapshot_at(1)).await;

    let receipt = h.handle.send_alert().await.unwrap();

    assert!(!receipt.success);
    assert_eq!(receipt.message.as_deref(), Some("bot token missing"));
}

#[tokio::test(start_paused = true)]
async fn shutdown_ends_the_runner() {
    let h = push_harness();

    h.handle.shutdown().await.unwrap();
    h.task.await.unwrap();

    assert!(matches!(
        h.handle.start().await,
        Err(SyncError::ClientClosed)
    ));
}
