use std::time::Duration;

use crate::rolling_window::DEFAULT_WINDOW_CAPACITY;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Base URL of the REST endpoints (`/signal`, `/signal/history`, ...).
    pub api_url: String,

    /// URL of the push channel.
    pub ws_url: String,

    // =========================
    // Connection policy
    // =========================
    /// Fixed delay between a lost channel and the next connection attempt.
    ///
    /// The delay does not grow and attempts are not capped.
    pub reconnect_delay: Duration,

    /// Cadence of the pull loop while the push channel is down.
    pub poll_interval: Duration,

    /// Cadence of the analytics refresh. Advanced analysis is pulled on every
    /// tick; history and performance every fourth tick.
    pub analytics_interval: Duration,

    // =========================
    // Buffers
    // =========================
    /// Number of price observations kept for the chart.
    pub window_capacity: usize,

    /// Capacity of the broadcast channel towards renderers.
    ///
    /// A renderer that falls further behind than this skips events.
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000/api".to_string(),
            ws_url: "ws://localhost:5000/ws".to_string(),
            reconnect_delay: Duration::from_secs(3),
            poll_interval: Duration::from_secs(30),
            analytics_interval: Duration::from_secs(30),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            event_buffer: 256,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or unparsable values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let count = |key: &str, default: usize| {
            lookup(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(default)
        };

        Self {
            api_url: lookup("SIGNAL_API_URL").unwrap_or(defaults.api_url),
            ws_url: lookup("SIGNAL_WS_URL").unwrap_or(defaults.ws_url),
            reconnect_delay: millis("SIGNAL_RECONNECT_DELAY_MS", defaults.reconnect_delay),
            poll_interval: millis("SIGNAL_POLL_INTERVAL_MS", defaults.poll_interval),
            analytics_interval: millis(
                "SIGNAL_ANALYTICS_INTERVAL_MS",
                defaults.analytics_interval,
            ),
            window_capacity: count("SIGNAL_WINDOW_CAPACITY", defaults.window_capacity),
            // broadcast::channel panics on zero capacity
            event_buffer: count("SIGNAL_EVENT_BUFFER", defaults.event_buffer).max(1),
        }
    }
}
