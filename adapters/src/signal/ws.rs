use async_trait::async_trait;
use futures::{StreamExt, future, stream};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, instrument, trace};

use super::{PushConnector, PushStream, SignalApiError, split_frame};

/// WebSocket implementation of the push channel.
///
/// One `connect()` is one connection attempt; reconnect policy belongs to the
/// caller. The returned stream:
/// - yields every JSON value of every text frame
/// - skips ping/pong and binary frames
/// - ends on a Close frame
/// - yields `Err` on transport failure
pub struct SignalWsConnector {
    pub ws_url: String,
}

impl SignalWsConnector {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }
}

#[async_trait]
impl PushConnector for SignalWsConnector {
    #[instrument(skip(self), fields(url = %self.ws_url))]
    async fn connect(&self) -> Result<PushStream, SignalApiError> {
        debug!("Attempting connection to signal WebSocket");

        let (ws, _) = connect_async(self.ws_url.as_str()).await?;

        info!("WebSocket connection established");

        let frames = ws
            .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => {
                        // Only log raw frames at TRACE level to avoid log bloat
                        trace!(raw = %text.as_str(), "Received raw WebSocket frame");
                        Some(Ok(text.as_str().to_owned()))
                    }
                    Ok(other) => {
                        trace!(msg_type = ?other, "Ignoring non-text WebSocket message");
                        None
                    }
                    Err(e) => Some(Err(SignalApiError::from(e))),
                })
            })
            .flat_map(|frame| {
                let items: Vec<Result<String, SignalApiError>> = match frame {
                    Ok(text) => split_frame(&text)
                        .into_iter()
                        .map(|raw| Ok(raw.to_string()))
                        .collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(items)
            });

        Ok(frames.boxed())
    }
}
