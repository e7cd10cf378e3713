pub mod client;
pub mod config;
pub mod error;
pub mod rolling_window;
pub mod runner;
pub mod transition;
pub mod types;

pub use client::{REPORT_REFRESH_TICKS, SyncClient};
pub use config::SyncConfig;
pub use error::SyncError;
pub use rolling_window::{Direction, PriceChange, PriceObservation, RollingWindow};
pub use runner::{SyncHandle, SyncRunner};
pub use transition::AlertGate;
pub use types::{Command, ConnectionState, SyncEvent, Visibility};
