use std::time::Duration;

use clap::{Parser, Subcommand};
use feed::SyncConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Keep the signal feed synchronised and log every update (default)
    #[default]
    Run,
    /// Print the current signal
    Signal,
    /// Print the signal history
    History,
    /// Print trading performance metrics
    Performance,
    /// Print multi-timeframe signal analytics
    Advanced,
    /// Print indicators per timeframe
    MultiTimeframe,
    /// Print the suggested position size
    PositionSize,
    /// Ask the service to send a test alert
    TestAlert,
}

#[derive(Debug, Parser)]
#[clap(name = "signal-dashboard", version)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Option<Commands>,

    /// Base URL of the signal REST API [env: SIGNAL_API_URL]
    #[clap(long, global = true)]
    pub api_url: Option<String>,

    /// URL of the push channel [env: SIGNAL_WS_URL]
    #[clap(long, global = true)]
    pub ws_url: Option<String>,

    /// Delay before reconnecting a lost push channel, in ms
    #[clap(long, global = true)]
    pub reconnect_delay_ms: Option<u64>,

    /// Pull cadence while the push channel is down, in ms
    #[clap(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    /// Analytics refresh cadence, in ms
    #[clap(long, global = true)]
    pub analytics_interval_ms: Option<u64>,

    /// Number of prices kept for the chart
    #[clap(long, global = true)]
    pub window_capacity: Option<usize>,

    /// Emit JSON log lines regardless of APP_ENV
    #[clap(long, global = true)]
    pub json_logs: bool,
}

impl Cli {
    /// Flags win over the environment.
    pub(crate) fn apply_overrides(&self, mut config: SyncConfig) -> SyncConfig {
        if let Some(url) = &self.api_url {
            config.api_url = url.clone();
        }
        if let Some(url) = &self.ws_url {
            config.ws_url = url.clone();
        }
        if let Some(ms) = self.reconnect_delay_ms {
            config.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.analytics_interval_ms {
            config.analytics_interval = Duration::from_millis(ms);
        }
        if let Some(capacity) = self.window_capacity {
            config.window_capacity = capacity;
        }
        config
    }
}
