//! Error dispositions for the relay engine.
//!
//! Most call sites use `anyhow::Result` with `.context(...)` and a
//! log-and-continue policy (per-peer fan-out, listener boundaries). This
//! enum exists for the handful of places that need to branch on *which*
//! kind of failure occurred rather than just logging it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("transient platform error: {0}")]
    Transient(String),

    #[error("permission denied or not found on {group}: {reason}")]
    PermissionDenied { group: String, reason: String },

    #[error("download/upload failed: {0}")]
    DownloadFailed(String),

    #[error("configuration missing for optional subsystem: {0}")]
    ConfigMissing(String),

    #[error("unknown platform prefix in channel id: {0}")]
    UnknownPlatform(String),

    #[error("message store failure: {0}")]
    StoreFailure(#[from] rusqlite::Error),
}
