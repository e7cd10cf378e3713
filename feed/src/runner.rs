//! SyncRunner
//!
//! Drives a [`SyncClient`] against real I/O. The runner owns every resource
//! the client asks for (the push stream, the reconnect timer, the poll and
//! analytics intervals, and all in-flight requests) and feeds their outcomes back into the
//! client one at a time. The client therefore never observes concurrent
//! mutation; ordering between push and pull is decided by its timestamp gate.
//!
//! Consumers talk to the runner through a cloneable [`SyncHandle`].

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use adapters::signal::{AlertDispatcher, PushConnector, PushStream, SignalApi, SignalApiError};
use common::logger::{TraceId, child_span, session_span};
use corelib::{AdvancedSignal, AlertReceipt, PerformanceReport, Signal, SignalSnapshot};
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep, interval_at, sleep};
use tracing::{Instrument, debug, info, warn};

use crate::client::SyncClient;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::types::{Command, ConnectionState, SyncEvent, Visibility};

const CONTROL_BUFFER: usize = 32;

enum Control {
    Start,
    Stop,
    Refresh,
    SendAlert(oneshot::Sender<Result<AlertReceipt, SyncError>>),
    Shutdown,
}

/// Result of a spawned request, tagged so the client can discard stale ones.
enum Completion {
    Connected {
        attempt: u64,
        result: Result<PushStream, SignalApiError>,
    },
    Pulled {
        epoch: u64,
        result: Result<SignalSnapshot, SignalApiError>,
    },
    History {
        epoch: u64,
        result: Result<Vec<SignalSnapshot>, SignalApiError>,
    },
    Performance {
        epoch: u64,
        result: Result<PerformanceReport, SignalApiError>,
    },
    Advanced {
        epoch: u64,
        result: Result<AdvancedSignal, SignalApiError>,
    },
    Alerted {
        signal: Signal,
        result: Result<AlertReceipt, SignalApiError>,
    },
}

enum Wake {
    Control(Option<Control>),
    Visibility(Option<Visibility>),
    Frame {
        attempt: u64,
        frame: Option<Result<String, SignalApiError>>,
    },
    Reconnect,
    Poll,
    Analytics,
    Completed(Result<Completion, JoinError>),
}

/// Cloneable front end to a running [`SyncRunner`].
#[derive(Clone)]
pub struct SyncHandle {
    control: mpsc::Sender<Control>,
    events: broadcast::Sender<SyncEvent>,
    latest: watch::Receiver<Option<SignalSnapshot>>,
    state: watch::Receiver<ConnectionState>,
}

impl SyncHandle {
    pub async fn start(&self) -> Result<(), SyncError> {
        self.send(Control::Start).await
    }

    pub async fn stop(&self) -> Result<(), SyncError> {
        self.send(Control::Stop).await
    }

    /// Pull the current signal, history and analytics immediately.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        self.send(Control::Refresh).await
    }

    /// Manually alert on the latest accepted snapshot.
    ///
    /// Does not touch the automatic transition memory.
    pub async fn send_alert(&self) -> Result<AlertReceipt, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Control::SendAlert(tx)).await?;
        rx.await.map_err(|_| SyncError::ClientClosed)?
    }

    /// Stop syncing and end the runner task.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        self.send(Control::Shutdown).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn latest(&self) -> Option<SignalSnapshot> {
        self.latest.borrow().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    async fn send(&self, control: Control) -> Result<(), SyncError> {
        self.control
            .send(control)
            .await
            .map_err(|_| SyncError::ClientClosed)
    }
}

pub struct SyncRunner {
    client: SyncClient,
    poll_interval: Duration,
    analytics_interval: Duration,

    api: Arc<dyn SignalApi>,
    connector: Arc<dyn PushConnector>,
    alerts: Arc<dyn AlertDispatcher>,

    control: mpsc::Receiver<Control>,
    visibility: watch::Receiver<Visibility>,
    visibility_open: bool,

    events: broadcast::Sender<SyncEvent>,
    latest: watch::Sender<Option<SignalSnapshot>>,
    state: watch::Sender<ConnectionState>,

    channel: Option<(u64, PushStream)>,
    connecting: Option<AbortHandle>,
    reconnect: Option<Pin<Box<Sleep>>>,
    tasks: JoinSet<Completion>,
}

impl SyncRunner {
    pub fn new(
        config: &SyncConfig,
        api: Arc<dyn SignalApi>,
        connector: Arc<dyn PushConnector>,
        alerts: Arc<dyn AlertDispatcher>,
        visibility: watch::Receiver<Visibility>,
    ) -> (Self, SyncHandle) {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER);
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let (latest_tx, latest_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let handle = SyncHandle {
            control: control_tx,
            events: events.clone(),
            latest: latest_rx,
            state: state_rx,
        };

        let runner = Self {
            client: SyncClient::new(config),
            // Interval panics on a zero period.
            poll_interval: config.poll_interval.max(Duration::from_millis(1)),
            analytics_interval: config.analytics_interval.max(Duration::from_millis(1)),
            api,
            connector,
            alerts,
            control: control_rx,
            visibility,
            visibility_open: true,
            events,
            latest: latest_tx,
            state: state_tx,
            channel: None,
            connecting: None,
            reconnect: None,
            tasks: JoinSet::new(),
        };

        (runner, handle)
    }

    /// Spawn the runner on the current runtime inside its own session span.
    pub fn spawn(self) -> JoinHandle<()> {
        let trace_id = TraceId::new();
        let span = session_span("signal_sync", &trace_id);
        tokio::spawn(self.run().instrument(span))
    }

    pub async fn run(mut self) {
        let mut poll = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut analytics = interval_at(
            Instant::now() + self.analytics_interval,
            self.analytics_interval,
        );
        analytics.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let initial = *self.visibility.borrow_and_update();
        let commands = self.client.on_visibility(initial);
        self.apply(commands);

        info!("sync runner started");

        loop {
            let commands = match self.next_wake(&mut poll, &mut analytics).await {
                Wake::Control(None) | Wake::Control(Some(Control::Shutdown)) => break,
                Wake::Control(Some(control)) => self.on_control(control),
                Wake::Visibility(Some(visibility)) => self.client.on_visibility(visibility),
                Wake::Visibility(None) => {
                    debug!("visibility source closed; keeping last known value");
                    self.visibility_open = false;
                    Vec::new()
                }
                Wake::Frame { attempt, frame } => self.on_frame(attempt, frame),
                Wake::Reconnect => self.client.on_reconnect_timer(),
                Wake::Poll => self.client.on_poll_tick(),
                Wake::Analytics => self.client.on_analytics_tick(),
                Wake::Completed(Ok(completion)) => self.on_completion(completion),
                Wake::Completed(Err(e)) => {
                    if !e.is_cancelled() {
                        warn!(error = %e, "sync request task failed");
                    }
                    Vec::new()
                }
            };

            self.apply(commands);
        }

        let commands = self.client.stop();
        self.apply(commands);

        info!("sync runner stopped");
    }

    async fn next_wake(&mut self, poll: &mut Interval, analytics: &mut Interval) -> Wake {
        tokio::select! {
            control = self.control.recv() => Wake::Control(control),

            changed = self.visibility.changed(), if self.visibility_open => match changed {
                Ok(()) => Wake::Visibility(Some(*self.visibility.borrow_and_update())),
                Err(_) => Wake::Visibility(None),
            },

            (attempt, frame) = next_frame(&mut self.channel), if self.channel.is_some() => {
                Wake::Frame { attempt, frame }
            }

            _ = wait_reconnect(&mut self.reconnect), if self.reconnect.is_some() => {
                self.reconnect = None;
                Wake::Reconnect
            }

            _ = poll.tick() => Wake::Poll,

            _ = analytics.tick() => Wake::Analytics,

            Some(done) = self.tasks.join_next() => Wake::Completed(done),
        }
    }

    fn on_control(&mut self, control: Control) -> Vec<Command> {
        match control {
            Control::Start => self.client.start(),
            Control::Stop => self.client.stop(),
            Control::Refresh => self.client.refresh(),
            Control::SendAlert(reply) => {
                self.send_manual_alert(reply);
                Vec::new()
            }
            // handled by the loop
            Control::Shutdown => Vec::new(),
        }
    }

    fn send_manual_alert(&self, reply: oneshot::Sender<Result<AlertReceipt, SyncError>>) {
        let Some(snapshot) = self.client.latest().cloned() else {
            let _ = reply.send(Err(SyncError::NoSnapshot));
            return;
        };

        let alerts = Arc::clone(&self.alerts);
        tokio::spawn(
            async move {
                let result = alerts
                    .dispatch(&snapshot)
                    .await
                    .map_err(|e| SyncError::AlertDispatch(e.to_string()));
                let _ = reply.send(result);
            }
            .instrument(child_span("manual_alert")),
        );
    }

    fn on_frame(
        &mut self,
        attempt: u64,
        frame: Option<Result<String, SignalApiError>>,
    ) -> Vec<Command> {
        match frame {
            Some(Ok(raw)) => self.client.on_message(attempt, &raw),
            Some(Err(e)) => {
                self.channel = None;
                self.client.on_channel_closed(attempt, Some(e.to_string()))
            }
            None => {
                self.channel = None;
                self.client.on_channel_closed(attempt, None)
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) -> Vec<Command> {
        match completion {
            Completion::Connected { attempt, result } => {
                if attempt == self.client.attempt() {
                    self.connecting = None;
                }

                match result {
                    Ok(stream) => {
                        let commands = self.client.on_channel_open(attempt);
                        if self.client.state() == ConnectionState::Connected
                            && self.client.attempt() == attempt
                        {
                            self.channel = Some((attempt, stream));
                        }
                        commands
                    }
                    Err(e) => self.client.on_channel_closed(attempt, Some(e.to_string())),
                }
            }
            Completion::Pulled { epoch, result } => self.client.on_pull_result(epoch, result),
            Completion::History { epoch, result } => self.client.on_history_result(epoch, result),
            Completion::Performance { epoch, result } => {
                self.client.on_performance_result(epoch, result)
            }
            Completion::Advanced { epoch, result } => {
                self.client.on_advanced_result(epoch, result)
            }
            Completion::Alerted { signal, result } => self.client.on_alert_result(signal, result),
        }
    }

    fn apply(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::OpenChannel { attempt } => {
                    self.release_channel();

                    let connector = Arc::clone(&self.connector);
                    let handle = self.tasks.spawn(
                        async move {
                            Completion::Connected {
                                attempt,
                                result: connector.connect().await,
                            }
                        }
                        .instrument(child_span("connect")),
                    );
                    self.connecting = Some(handle);
                }
                Command::CloseChannel => self.release_channel(),
                Command::ScheduleReconnect { delay } => {
                    debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                    self.reconnect = Some(Box::pin(sleep(delay)));
                }
                Command::CancelReconnect => self.reconnect = None,
                Command::PullSignal { epoch } => {
                    let api = Arc::clone(&self.api);
                    self.tasks.spawn(
                        async move {
                            Completion::Pulled {
                                epoch,
                                result: api.fetch_signal().await,
                            }
                        }
                        .instrument(child_span("pull_signal")),
                    );
                }
                Command::RefreshHistory { epoch } => {
                    let api = Arc::clone(&self.api);
                    self.tasks.spawn(
                        async move {
                            Completion::History {
                                epoch,
                                result: api.fetch_history().await,
                            }
                        }
                        .instrument(child_span("pull_history")),
                    );
                }
                Command::RefreshPerformance { epoch } => {
                    let api = Arc::clone(&self.api);
                    self.tasks.spawn(
                        async move {
                            Completion::Performance {
                                epoch,
                                result: api.fetch_performance().await,
                            }
                        }
                        .instrument(child_span("pull_performance")),
                    );
                }
                Command::RefreshAdvanced { epoch } => {
                    let api = Arc::clone(&self.api);
                    self.tasks.spawn(
                        async move {
                            Completion::Advanced {
                                epoch,
                                result: api.fetch_advanced_signal().await,
                            }
                        }
                        .instrument(child_span("pull_advanced")),
                    );
                }
                Command::CancelInFlight => {
                    self.tasks.abort_all();
                    self.connecting = None;
                }
                Command::DispatchAlert(snapshot) => {
                    let alerts = Arc::clone(&self.alerts);
                    self.tasks.spawn(
                        async move {
                            Completion::Alerted {
                                signal: snapshot.signal,
                                result: alerts.dispatch(&snapshot).await,
                            }
                        }
                        .instrument(child_span("dispatch_alert")),
                    );
                }
                Command::Publish(event) => self.publish(event),
            }
        }
    }

    fn publish(&self, event: SyncEvent) {
        match &event {
            SyncEvent::Snapshot { snapshot, .. } => {
                self.latest.send_replace(Some(snapshot.clone()));
            }
            SyncEvent::Connection(state) => {
                self.state.send_replace(*state);
            }
            _ => {}
        }

        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn release_channel(&mut self) {
        if let Some(connecting) = self.connecting.take() {
            connecting.abort();
        }
        if let Some((attempt, _)) = self.channel.take() {
            debug!(attempt, "push channel released");
        }
    }
}

async fn next_frame(
    channel: &mut Option<(u64, PushStream)>,
) -> (u64, Option<Result<String, SignalApiError>>) {
    match channel {
        Some((attempt, stream)) => (*attempt, stream.next().await),
        None => pending().await,
    }
}

async fn wait_reconnect(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
