use std::time::Duration;

use corelib::{AdvancedSignal, PerformanceReport, Signal, SignalSnapshot};

use crate::rolling_window::PriceChange;

/// Lifecycle of the push channel as tracked by the sync client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Host is hidden/backgrounded; nothing is opened or scheduled.
    Suspended,
}

/// Host visibility as reported by the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// What the rendering layer gets to see.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A snapshot passed the staleness gate and is now the latest.
    Snapshot {
        snapshot: SignalSnapshot,
        change: Option<PriceChange>,
    },

    /// Fresh signal history, most recent first.
    History(Vec<SignalSnapshot>),

    /// Fresh trading performance metrics.
    Performance(PerformanceReport),

    /// Fresh multi-timeframe analysis and position sizing.
    Advanced(AdvancedSignal),

    Connection(ConnectionState),

    /// Advisory: `true` while data is coming from polling instead of the
    /// push channel.
    Fallback(bool),

    /// The signal moved to a new actionable value; an alert was requested.
    Transition(SignalSnapshot),

    /// Outcome of an automatic alert dispatch.
    AlertSent { signal: Signal, success: bool },
}

/// Side effects requested by [`crate::SyncClient`]; executed by the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Drop any existing channel and open a new one tagged `attempt`.
    OpenChannel { attempt: u64 },
    CloseChannel,
    ScheduleReconnect { delay: Duration },
    CancelReconnect,
    PullSignal { epoch: u64 },
    RefreshHistory { epoch: u64 },
    RefreshPerformance { epoch: u64 },
    RefreshAdvanced { epoch: u64 },
    /// Abort every request still in flight.
    CancelInFlight,
    DispatchAlert(SignalSnapshot),
    Publish(SyncEvent),
}
