//! Push payload parser.
//!
//! The signal service pushes one JSON object per snapshot. Objects may be
//! pretty-printed across several lines, and several of them may share a single
//! WebSocket text frame, so frames are first split into whole JSON values with
//! [`split_frame`] and every value is decoded on its own with
//! [`parse_signal_payload`]:
//!
//! ```jsonc
//! {
//!   "signal": "BUY",
//!   "binancePrice": 64250.5,
//!   "dexPrice": 64301.0,
//!   "spread": 0.08,
//!   "rsi": 28.4,
//!   "ema": 64100.0,
//!   "timestamp": "2024-05-01T12:00:00Z",
//!   "signal_strength": 71.0          // optional advanced fields
//! }
//! ```
//!
//! The parser is stateless. Ordering, staleness and alerting are decided by
//! the sync client; this module only answers "is this a valid snapshot".

use corelib::SignalSnapshot;
use serde::de::IgnoredAny;

use super::SignalApiError;

/// Split a raw frame into its top-level JSON values.
///
/// Values may span lines or sit back to back. Text that does not scan as
/// JSON is returned up to the end of its line, so the caller reports it as
/// malformed, and scanning resumes on the next line.
pub fn split_frame(frame: &str) -> Vec<&str> {
    let mut payloads = Vec::new();
    let mut rest = frame.trim_start();

    while !rest.is_empty() {
        let mut values = serde_json::Deserializer::from_str(rest).into_iter::<IgnoredAny>();
        let end = match values.next() {
            Some(Ok(_)) => values.byte_offset(),
            _ => rest.find('\n').unwrap_or(rest.len()),
        };

        let (payload, tail) = rest.split_at(end);
        let payload = payload.trim();
        if !payload.is_empty() {
            payloads.push(payload);
        }
        rest = tail.trim_start();
    }

    payloads
}

/// Decode and validate one push payload.
pub fn parse_signal_payload(raw: &str) -> Result<SignalSnapshot, SignalApiError> {
    let snapshot: SignalSnapshot = serde_json::from_str(raw)
        .map_err(|e| SignalApiError::MalformedPayload(e.to_string()))?;

    snapshot
        .validate()
        .map_err(|e| SignalApiError::MalformedPayload(e.to_string()))?;

    Ok(snapshot)
}
