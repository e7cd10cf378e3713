use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::timestamp;

/// Trading signal emitted by the bot.
///
/// The wire form is an upper-case string. Anything the bot sends that is not
/// one of the known kinds (including a missing field or `null`) is treated as
/// `Wait`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
    #[default]
    Wait,
}

impl Signal {
    /// BUY and SELL are the only kinds worth alerting on.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Signal::Buy | Signal::Sell)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
            Signal::Wait => "WAIT",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Signal {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Signal::Buy,
            "SELL" => Signal::Sell,
            "HOLD" => Signal::Hold,
            _ => Signal::Wait,
        }
    }
}

impl From<String> for Signal {
    fn from(raw: String) -> Self {
        Signal::from(raw.as_str())
    }
}

impl From<Option<String>> for Signal {
    fn from(raw: Option<String>) -> Self {
        raw.map(Signal::from).unwrap_or_default()
    }
}

impl From<Signal> for String {
    fn from(signal: Signal) -> Self {
        signal.as_str().to_string()
    }
}

/// Optional analytics the bot attaches when its advanced mode is on.
///
/// Every field is independently absent; `None` is never the same as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvancedMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_size: Option<f64>,

    // Trading-mode flags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_trading: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_position: Option<bool>,
}

/// One point-in-time read of signal, prices and indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    #[serde(default)]
    pub signal: Signal,

    #[serde(rename = "binancePrice")]
    pub binance_price: f64,

    #[serde(rename = "dexPrice")]
    pub dex_price: f64,

    /// DEX vs Binance spread, signed percent.
    pub spread: f64,

    /// Conventionally 0–100; not clamped.
    pub rsi: f64,

    pub ema: f64,

    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub advanced: AdvancedMetrics,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidSnapshot {
    #[error("{field} must be a finite positive number, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },
}

impl SignalSnapshot {
    /// Price observed by the rolling window.
    pub fn primary_price(&self) -> f64 {
        self.binance_price
    }

    /// Check the numeric invariants of a freshly decoded snapshot.
    pub fn validate(&self) -> Result<(), InvalidSnapshot> {
        for (field, value) in [
            ("binancePrice", self.binance_price),
            ("dexPrice", self.dex_price),
            ("ema", self.ema),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(InvalidSnapshot::NonPositive { field, value });
            }
        }

        for (field, value) in [("spread", self.spread), ("rsi", self.rsi)] {
            if !value.is_finite() {
                return Err(InvalidSnapshot::NotFinite { field, value });
            }
        }

        Ok(())
    }
}

/// Response body of the alert endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
