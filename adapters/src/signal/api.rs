use async_trait::async_trait;
use corelib::{AdvancedSignal, AlertReceipt, PerformanceReport, SignalSnapshot};
use futures::stream::BoxStream;

use super::SignalApiError;

/// Live push channel as seen by the sync client.
///
/// Each item is one raw payload. The stream ending means the peer closed the
/// channel; an `Err` item means the transport failed.
pub type PushStream = BoxStream<'static, Result<String, SignalApiError>>;

/// Request/response side of the signal service.
#[async_trait]
pub trait SignalApi: Send + Sync {
    /// `GET /signal`
    async fn fetch_signal(&self) -> Result<SignalSnapshot, SignalApiError>;

    /// `GET /signal/history`, most recent first.
    async fn fetch_history(&self) -> Result<Vec<SignalSnapshot>, SignalApiError>;

    /// `GET /performance`
    async fn fetch_performance(&self) -> Result<PerformanceReport, SignalApiError>;

    /// `GET /advanced-signal`
    async fn fetch_advanced_signal(&self) -> Result<AdvancedSignal, SignalApiError>;
}

/// Outbound alerting collaborator.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn dispatch(&self, snapshot: &SignalSnapshot) -> Result<AlertReceipt, SignalApiError>;
}

/// Opens the push channel.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self) -> Result<PushStream, SignalApiError>;
}
