use chrono::{DateTime, Utc};
use corelib::InvalidSnapshot;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[from] InvalidSnapshot),

    #[error("stale snapshot: held {held}, received {received}")]
    StaleSnapshot {
        held: DateTime<Utc>,
        received: DateTime<Utc>,
    },

    #[error("alert dispatch failed: {0}")]
    AlertDispatch(String),

    #[error("no snapshot available yet")]
    NoSnapshot,

    #[error("sync client is no longer running")]
    ClientClosed,
}
