use corelib::InvalidSnapshot;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[from] InvalidSnapshot),
}

impl From<tokio_tungstenite::tungstenite::Error> for SignalApiError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}

impl SignalApiError {
    /// Failures of the connection itself, as opposed to bad data on a
    /// healthy connection.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::WebSocket(_))
    }
}
