//! Sync client state machine.
//!
//! Keeps the local view of the current trading signal fresh. The push channel
//! is preferred; while it is down the client falls back to pulling. Both paths
//! funnel into [`SyncClient::on_snapshot`], whose timestamp gate is the only
//! thing preventing a slow pull from overwriting a newer push (or vice versa).
//!
//! The client performs no I/O. Every input is a method call and every side
//! effect comes back as a list of [`Command`]s for the runner to execute. This
//! keeps the whole lifecycle (reconnects, suspension, stale completions)
//! testable without sockets or timers.
//!
//! Connection lifecycle:
//!
//! ```text
//!  Disconnected --start/reconnect--> Connecting --open--> Connected
//!       ^                                |                    |
//!       +-----------close/error----------+--------------------+
//!
//!  any --hidden--> Suspended --visible--> Connecting
//! ```
//!
//! Stale events are filtered by two counters:
//! - `attempt` tags every channel open; events from an older attempt are dropped
//! - `epoch` tags every pull; `stop()` bumps it so late completions are dropped
//!
//! Besides the signal itself the client keeps the analytics panels fresh on
//! their own tick: advanced analysis every tick, history and performance
//! every [`REPORT_REFRESH_TICKS`] ticks.

use std::time::Duration;

use adapters::signal::{SignalApiError, parse_signal_payload};
use corelib::{AdvancedSignal, AlertReceipt, PerformanceReport, Signal, SignalSnapshot};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::rolling_window::{PriceObservation, RollingWindow};
use crate::transition::AlertGate;
use crate::types::{Command, ConnectionState, SyncEvent, Visibility};

/// Analytics ticks between two history/performance refreshes.
pub const REPORT_REFRESH_TICKS: u64 = 4;

#[derive(Debug)]
pub struct SyncClient {
    state: ConnectionState,
    visibility: Visibility,
    started: bool,

    attempt: u64,
    epoch: u64,
    reconnect_pending: bool,
    fallback: bool,
    reconnect_delay: Duration,
    analytics_ticks: u64,

    latest: Option<SignalSnapshot>,
    window: RollingWindow,
    alerts: AlertGate,
}

impl SyncClient {
    pub fn new(config: &SyncConfig) -> Self {
        Self::with_policy(config.reconnect_delay, config.window_capacity)
    }

    pub fn with_policy(reconnect_delay: Duration, window_capacity: usize) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            visibility: Visibility::Visible,
            started: false,
            attempt: 0,
            epoch: 0,
            reconnect_pending: false,
            fallback: false,
            reconnect_delay,
            analytics_ticks: 0,
            latest: None,
            window: RollingWindow::new(window_capacity),
            alerts: AlertGate::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn latest(&self) -> Option<&SignalSnapshot> {
        self.latest.as_ref()
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn last_notified(&self) -> Option<Signal> {
        self.alerts.last_notified()
    }

    /// Tag of the most recent channel attempt.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Tag handed to pulls issued now.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Begin syncing. No-op while a channel is opening or open.
    pub fn start(&mut self) -> Vec<Command> {
        let mut out = Vec::new();

        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(state = ?self.state, "start ignored; channel already live");
            return out;
        }

        self.started = true;

        if self.visibility == Visibility::Hidden {
            info!("start requested while hidden; suspending until visible");
            self.set_state(ConnectionState::Suspended, &mut out);
            return out;
        }

        info!("sync client starting");
        self.cancel_reconnect(&mut out);
        self.open_channel(&mut out);
        out.extend(self.refresh_reports());

        out
    }

    /// Tear everything down. Completions of work issued before this call are
    /// ignored when they arrive.
    pub fn stop(&mut self) -> Vec<Command> {
        let mut out = vec![
            Command::CloseChannel,
            Command::CancelReconnect,
            Command::CancelInFlight,
        ];

        self.started = false;
        self.reconnect_pending = false;
        self.fallback = false;
        self.analytics_ticks = 0;
        self.epoch += 1;

        self.set_state(ConnectionState::Disconnected, &mut out);
        info!(epoch = self.epoch, "sync client stopped");

        out
    }

    /// Manual refresh: pull the current signal and every report right away.
    pub fn refresh(&mut self) -> Vec<Command> {
        let mut out = vec![Command::PullSignal { epoch: self.epoch }];
        out.extend(self.refresh_reports());
        out
    }

    fn refresh_reports(&self) -> [Command; 3] {
        [
            Command::RefreshHistory { epoch: self.epoch },
            Command::RefreshPerformance { epoch: self.epoch },
            Command::RefreshAdvanced { epoch: self.epoch },
        ]
    }

    // ---------------------------------------------------------------------
    // Push channel
    // ---------------------------------------------------------------------

    pub fn on_channel_open(&mut self, attempt: u64) -> Vec<Command> {
        let mut out = Vec::new();

        if attempt != self.attempt || self.state != ConnectionState::Connecting {
            debug!(
                attempt,
                current = self.attempt,
                state = ?self.state,
                "ignoring stale channel open"
            );
            return out;
        }

        info!(attempt, "push channel connected");
        self.set_fallback(false, &mut out);
        self.set_state(ConnectionState::Connected, &mut out);
        out.push(Command::RefreshHistory { epoch: self.epoch });

        out
    }

    /// Channel ended. `transport_error` is set when it failed rather than
    /// closed cleanly; a failure also triggers an immediate one-shot pull.
    pub fn on_channel_closed(
        &mut self,
        attempt: u64,
        transport_error: Option<String>,
    ) -> Vec<Command> {
        let mut out = Vec::new();

        if attempt != self.attempt
            || !matches!(
                self.state,
                ConnectionState::Connecting | ConnectionState::Connected
            )
        {
            debug!(
                attempt,
                current = self.attempt,
                state = ?self.state,
                "ignoring stale channel close"
            );
            return out;
        }

        out.push(Command::CloseChannel);
        self.set_state(ConnectionState::Disconnected, &mut out);
        self.set_fallback(true, &mut out);

        match transport_error {
            Some(error) => {
                warn!(attempt, %error, "push channel failed; falling back to polling");
                out.push(Command::PullSignal { epoch: self.epoch });
            }
            None => info!(attempt, "push channel closed"),
        }

        self.schedule_reconnect(&mut out);

        out
    }

    /// One raw payload from the channel tagged `attempt`.
    pub fn on_message(&mut self, attempt: u64, raw: &str) -> Vec<Command> {
        if attempt != self.attempt || self.state != ConnectionState::Connected {
            debug!(attempt, current = self.attempt, "ignoring message from stale channel");
            return Vec::new();
        }

        match Self::decode(raw) {
            Ok(snapshot) => self.on_snapshot(snapshot),
            Err(e) => {
                warn!(error = %e, raw = %raw, "dropping push payload");
                Vec::new()
            }
        }
    }

    fn decode(raw: &str) -> Result<SignalSnapshot, SyncError> {
        parse_signal_payload(raw).map_err(|e| SyncError::MalformedPayload(e.to_string()))
    }

    // ---------------------------------------------------------------------
    // Snapshot gate (shared by push and pull)
    // ---------------------------------------------------------------------

    pub fn on_snapshot(&mut self, snapshot: SignalSnapshot) -> Vec<Command> {
        let mut out = Vec::new();

        match self.admit(&snapshot) {
            Ok(()) => {}
            Err(e @ SyncError::InvalidSnapshot(_)) => {
                warn!(error = %e, ts = %snapshot.timestamp, "dropping invalid snapshot");
                return out;
            }
            Err(e) => {
                debug!(reason = %e, "snapshot rejected");
                return out;
            }
        }

        self.window.push(PriceObservation {
            ts: snapshot.timestamp,
            price: snapshot.primary_price(),
        });
        let change = self.window.latest_change();

        debug!(
            signal = %snapshot.signal,
            price = snapshot.binance_price,
            ts = %snapshot.timestamp,
            "snapshot accepted"
        );

        out.push(Command::Publish(SyncEvent::Snapshot {
            snapshot: snapshot.clone(),
            change,
        }));

        if self.alerts.evaluate(snapshot.signal) {
            info!(
                signal = %snapshot.signal,
                ts = %snapshot.timestamp,
                "actionable signal transition"
            );
            out.push(Command::DispatchAlert(snapshot.clone()));
            out.push(Command::Publish(SyncEvent::Transition(snapshot.clone())));
            out.push(Command::RefreshHistory { epoch: self.epoch });
        }

        self.latest = Some(snapshot);

        out
    }

    /// Pushed and pulled snapshots both pass here, as may any caller of
    /// [`Self::on_snapshot`], so validity is checked again.
    fn admit(&self, snapshot: &SignalSnapshot) -> Result<(), SyncError> {
        snapshot.validate()?;
        self.check_fresh(snapshot)
    }

    /// Older than what is held, or an exact repeat of it.
    fn check_fresh(&self, snapshot: &SignalSnapshot) -> Result<(), SyncError> {
        let Some(held) = &self.latest else {
            return Ok(());
        };

        if snapshot.timestamp < held.timestamp || snapshot == held {
            return Err(SyncError::StaleSnapshot {
                held: held.timestamp,
                received: snapshot.timestamp,
            });
        }

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Pull completions
    // ---------------------------------------------------------------------

    pub fn on_pull_result(
        &mut self,
        epoch: u64,
        result: Result<SignalSnapshot, SignalApiError>,
    ) -> Vec<Command> {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding pull from previous session");
            return Vec::new();
        }

        match result {
            Ok(snapshot) => self.on_snapshot(snapshot),
            Err(e) => {
                warn!(error = %e, "signal pull failed");
                Vec::new()
            }
        }
    }

    pub fn on_history_result(
        &mut self,
        epoch: u64,
        result: Result<Vec<SignalSnapshot>, SignalApiError>,
    ) -> Vec<Command> {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding history from previous session");
            return Vec::new();
        }

        match result {
            Ok(history) => vec![Command::Publish(SyncEvent::History(history))],
            Err(e) => {
                warn!(error = %e, "signal history pull failed");
                Vec::new()
            }
        }
    }

    pub fn on_performance_result(
        &mut self,
        epoch: u64,
        result: Result<PerformanceReport, SignalApiError>,
    ) -> Vec<Command> {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding performance from previous session");
            return Vec::new();
        }

        match result {
            Ok(report) => vec![Command::Publish(SyncEvent::Performance(report))],
            Err(e) => {
                warn!(error = %e, "performance pull failed");
                Vec::new()
            }
        }
    }

    pub fn on_advanced_result(
        &mut self,
        epoch: u64,
        result: Result<AdvancedSignal, SignalApiError>,
    ) -> Vec<Command> {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding advanced signal from previous session");
            return Vec::new();
        }

        match result {
            Ok(advanced) => vec![Command::Publish(SyncEvent::Advanced(advanced))],
            Err(e) => {
                warn!(error = %e, "advanced signal pull failed");
                Vec::new()
            }
        }
    }

    /// Outcome of an automatic alert. Reported, never retried.
    pub fn on_alert_result(
        &mut self,
        signal: Signal,
        result: Result<AlertReceipt, SignalApiError>,
    ) -> Vec<Command> {
        let success = match result {
            Ok(receipt) => receipt.success,
            Err(e) => {
                warn!(%signal, error = %e, "alert dispatch failed");
                false
            }
        };

        vec![Command::Publish(SyncEvent::AlertSent { signal, success })]
    }

    // ---------------------------------------------------------------------
    // Timers and host environment
    // ---------------------------------------------------------------------

    pub fn on_reconnect_timer(&mut self) -> Vec<Command> {
        let mut out = Vec::new();

        if !self.reconnect_pending {
            return out;
        }
        self.reconnect_pending = false;

        if !self.started
            || self.state != ConnectionState::Disconnected
            || self.visibility == Visibility::Hidden
        {
            debug!(state = ?self.state, "reconnect timer fired with nothing to do");
            return out;
        }

        info!("reconnecting push channel");
        self.open_channel(&mut out);

        out
    }

    /// Periodic pull; only runs while the push channel is not carrying data.
    pub fn on_poll_tick(&mut self) -> Vec<Command> {
        let polling = self.started
            && self.visibility == Visibility::Visible
            && matches!(
                self.state,
                ConnectionState::Disconnected | ConnectionState::Connecting
            );

        if polling {
            vec![Command::PullSignal { epoch: self.epoch }]
        } else {
            Vec::new()
        }
    }

    /// Analytics refresh; runs whenever the client is started and visible,
    /// whatever the state of the push channel.
    pub fn on_analytics_tick(&mut self) -> Vec<Command> {
        if !self.started || self.visibility == Visibility::Hidden {
            return Vec::new();
        }

        self.analytics_ticks += 1;

        if self.analytics_ticks % REPORT_REFRESH_TICKS == 0 {
            self.refresh_reports().to_vec()
        } else {
            vec![Command::RefreshAdvanced { epoch: self.epoch }]
        }
    }

    pub fn on_visibility(&mut self, visibility: Visibility) -> Vec<Command> {
        let mut out = Vec::new();

        if visibility == self.visibility {
            return out;
        }
        self.visibility = visibility;

        if !self.started {
            return out;
        }

        match visibility {
            Visibility::Hidden => {
                info!(state = ?self.state, "host hidden; suspending sync");
                out.push(Command::CloseChannel);
                self.cancel_reconnect(&mut out);
                self.set_state(ConnectionState::Suspended, &mut out);
            }
            Visibility::Visible => {
                if self.state == ConnectionState::Suspended {
                    info!("host visible again; resuming sync");
                    self.open_channel(&mut out);
                }
            }
        }

        out
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn open_channel(&mut self, out: &mut Vec<Command>) {
        self.attempt += 1;
        self.set_state(ConnectionState::Connecting, out);
        out.push(Command::OpenChannel {
            attempt: self.attempt,
        });
    }

    fn schedule_reconnect(&mut self, out: &mut Vec<Command>) {
        if !self.started || self.visibility == Visibility::Hidden {
            return;
        }

        self.reconnect_pending = true;
        out.push(Command::ScheduleReconnect {
            delay: self.reconnect_delay,
        });
    }

    fn cancel_reconnect(&mut self, out: &mut Vec<Command>) {
        if self.reconnect_pending {
            self.reconnect_pending = false;
            out.push(Command::CancelReconnect);
        }
    }

    fn set_state(&mut self, next: ConnectionState, out: &mut Vec<Command>) {
        if self.state == next {
            return;
        }

        debug!(from = ?self.state, to = ?next, "connection state change");
        self.state = next;
        out.push(Command::Publish(SyncEvent::Connection(next)));
    }

    fn set_fallback(&mut self, on: bool, out: &mut Vec<Command>) {
        if self.fallback == on {
            return;
        }

        self.fallback = on;
        out.push(Command::Publish(SyncEvent::Fallback(on)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use corelib::AdvancedMetrics;
    use tracing_test::traced_test;

    fn snapshot(signal: Signal, secs: i64) -> SignalSnapshot {
        SignalSnapshot {
            signal,
            binance_price: 100.0,
            dex_price: 100.5,
            spread: 0.5,
            rsi: 50.0,
            ema: 100.0,
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            advanced: AdvancedMetrics::default(),
        }
    }

    fn connected() -> SyncClient {
        let mut client = SyncClient::with_policy(Duration::from_secs(3), 20);
        client.start();
        client.on_channel_open(client.attempt());
        client
    }

    #[test]
    fn stale_check_reports_both_timestamps() {
        let mut client = connected();
        client.on_snapshot(snapshot(Signal::Hold, 10));

        let err = client.check_fresh(&snapshot(Signal::Buy, 5)).unwrap_err();

        let SyncError::StaleSnapshot { held, received } = err else {
            panic!("expected stale snapshot, got {err:?}");
        };
        assert!(received < held);
    }

    #[test]
    #[traced_test]
    fn unvalidated_snapshot_is_refused() {
        let mut client = connected();

        let mut zero = snapshot(Signal::Buy, 1);
        zero.binance_price = 0.0;
        assert!(client.on_snapshot(zero).is_empty());

        let mut broken = snapshot(Signal::Sell, 2);
        broken.rsi = f64::NAN;
        assert!(client.on_snapshot(broken).is_empty());

        assert!(client.latest().is_none());
        assert!(client.window().is_empty());
        assert_eq!(client.last_notified(), None);
        assert!(logs_contain("dropping invalid snapshot"));
    }

    #[test]
    fn decode_maps_failures_to_malformed_payload() {
        assert!(matches!(
            SyncClient::decode("[1, 2, 3]"),
            Err(SyncError::MalformedPayload(_))
        ));
    }

    #[test]
    #[traced_test]
    fn malformed_push_is_logged_and_dropped() {
        let mut client = connected();

        assert!(client.on_message(client.attempt(), "garbage").is_empty());
        assert!(logs_contain("dropping push payload"));
    }

    #[test]
    #[traced_test]
    fn channel_failure_is_logged_as_fallback() {
        let mut client = connected();

        client.on_channel_closed(client.attempt(), Some("reset by peer".into()));

        assert!(logs_contain("falling back to polling"));
        assert!(client.is_fallback());
    }
}
