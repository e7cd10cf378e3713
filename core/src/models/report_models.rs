use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `GET /performance` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    #[serde(default)]
    pub metrics: Option<PerformanceMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(default)]
    pub win_rate: Option<f64>,
    #[serde(default)]
    pub total_profit_loss: Option<f64>,
    #[serde(default)]
    pub total_trades: Option<u64>,
    #[serde(default)]
    pub sharpe_ratio: Option<f64>,
    #[serde(default)]
    pub current_balance: Option<f64>,
}

/// Indicators computed on a single timeframe (e.g. `1m`, `5m`, `1h`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeframeIndicators {
    #[serde(default)]
    pub rsi: Option<f64>,
    #[serde(default)]
    pub ema: Option<f64>,
}

/// `GET /advanced-signal` body: multi-timeframe analysis plus sizing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvancedSignal {
    #[serde(default)]
    pub signal_strength: Option<f64>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub volatility: Option<f64>,
    #[serde(default)]
    pub position_size: Option<f64>,
    #[serde(default)]
    pub timeframe_data: BTreeMap<String, TimeframeIndicators>,
}

/// `GET /multi-timeframe` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiTimeframeAnalysis {
    #[serde(default)]
    pub timeframe_data: BTreeMap<String, TimeframeIndicators>,
}

/// `GET /position-size` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSizing {
    #[serde(default)]
    pub position_size: Option<f64>,
    #[serde(default)]
    pub volatility: Option<f64>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}
