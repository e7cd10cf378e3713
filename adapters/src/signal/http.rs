use std::time::Duration;

use async_trait::async_trait;
use corelib::{
    AdvancedSignal, AlertReceipt, MultiTimeframeAnalysis, PerformanceReport, PositionSizing,
    SignalSnapshot,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::{AlertDispatcher, SignalApi, SignalApiError};

/// REST client for the signal service.
#[derive(Clone)]
pub struct SignalHttpClient {
    http: Client,
    url: String,
}

impl SignalHttpClient {
    pub fn new(url: impl Into<String>) -> Result<Self, SignalApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        let url = url.into().trim_end_matches('/').to_string();

        Ok(Self { http, url })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SignalApiError> {
        let url = format!("{}{}", self.url, path);

        let resp = self.http.get(&url).send().await?.error_for_status()?;

        Ok(resp.json().await?)
    }

    /// `GET /multi-timeframe`: indicators per timeframe on their own.
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_multi_timeframe(&self) -> Result<MultiTimeframeAnalysis, SignalApiError> {
        self.get_json("/multi-timeframe").await
    }

    /// `GET /position-size`: suggested sizing on its own.
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_position_size(&self) -> Result<PositionSizing, SignalApiError> {
        self.get_json("/position-size").await
    }

    /// `GET /test-telegram`: asks the service to send a canned alert.
    #[instrument(skip(self), level = "debug")]
    pub async fn send_test_alert(&self) -> Result<AlertReceipt, SignalApiError> {
        self.get_json("/test-telegram").await
    }
}

#[async_trait]
impl SignalApi for SignalHttpClient {
    #[instrument(skip(self), fields(url = %self.url), level = "debug")]
    async fn fetch_signal(&self) -> Result<SignalSnapshot, SignalApiError> {
        let snapshot: SignalSnapshot = self.get_json("/signal").await?;
        snapshot.validate()?;

        debug!(
            signal = %snapshot.signal,
            price = snapshot.binance_price,
            ts = %snapshot.timestamp,
            "signal pulled"
        );

        Ok(snapshot)
    }

    #[instrument(skip(self), fields(url = %self.url), level = "debug")]
    async fn fetch_history(&self) -> Result<Vec<SignalSnapshot>, SignalApiError> {
        let history: Vec<SignalSnapshot> = self.get_json("/signal/history").await?;

        debug!(len = history.len(), "signal history pulled");

        Ok(history)
    }

    #[instrument(skip(self), fields(url = %self.url), level = "debug")]
    async fn fetch_performance(&self) -> Result<PerformanceReport, SignalApiError> {
        self.get_json("/performance").await
    }

    #[instrument(skip(self), fields(url = %self.url), level = "debug")]
    async fn fetch_advanced_signal(&self) -> Result<AdvancedSignal, SignalApiError> {
        let advanced: AdvancedSignal = self.get_json("/advanced-signal").await?;

        debug!(
            timeframes = advanced.timeframe_data.len(),
            confidence = ?advanced.confidence_score,
            "advanced signal pulled"
        );

        Ok(advanced)
    }
}

#[async_trait]
impl AlertDispatcher for SignalHttpClient {
    #[instrument(skip(self, snapshot), fields(signal = %snapshot.signal), level = "debug")]
    async fn dispatch(&self, snapshot: &SignalSnapshot) -> Result<AlertReceipt, SignalApiError> {
        let url = format!("{}/send-telegram", self.url);

        let resp = self
            .http
            .post(&url)
            .json(snapshot)
            .send()
            .await?
            .error_for_status()?;

        let receipt: AlertReceipt = resp.json().await?;

        if !receipt.success {
            warn!(message = ?receipt.message, "alert endpoint reported failure");
        }

        Ok(receipt)
    }
}
