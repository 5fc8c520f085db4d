//! Error taxonomy.
//!
//! Each variant corresponds to one of the six documented error kinds, so
//! call sites can match on kind to decide the right recovery policy instead
//! of inspecting an opaque `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GslbError {
    /// Kind 1: reject the offending object, continue with the rest of the batch.
    #[error("spec validation failed for {id}: {reason}")]
    SpecValidation { id: String, reason: String },

    /// Kind 2: mark the target down, continue the tick.
    #[error("probe failed for {target}: {reason}")]
    ProbeFailure { target: String, reason: String },

    /// Kind 3: skip this config, keep its previous generation, report.
    #[error("synthesis failed for {domain}: {reason}")]
    Synthesis { domain: String, reason: String },

    /// Kind 4: abandon this generation, previous remains live, retry next tick.
    #[error("publish failed for generation {generation}: {reason}")]
    Publish { generation: u64, reason: String },

    /// Kind 5: log only, both generations remain coherent on disk.
    #[error("reload signal failed: {reason}")]
    ReloadSignal { reason: String },

    /// Kind 6: reconnect with backoff, resync via atomic relist.
    #[error("watch stream disconnected: {reason}")]
    WatchDisconnect { reason: String },

    /// Unrecoverable startup failure: missing config dir / no write permission /
    /// invalid process configuration. These are the only fatal errors.
    #[error("fatal startup error: {0}")]
    Fatal(String),
}
