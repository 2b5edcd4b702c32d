//! Crate error type.
//!
//! None of these conditions are transient, so callers are expected to surface
//! them as-is rather than retry.

use thiserror::Error;

use crate::types::BackendKind;

/// Errors produced by workload construction, probing, and reporting.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Negative or otherwise unusable input (e.g. a workload size below zero).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The selected backend's facility is absent on this host.
    #[error("{backend} backend is unavailable on this host: {reason}")]
    UnsupportedPlatform {
        /// Backend that was asked to sample.
        backend: BackendKind,
        /// What is missing.
        reason: String,
    },

    /// A tracing snapshot was requested before `start()`.
    #[error("allocation tracing has not been started")]
    TracingNotStarted,

    /// The backend only produces aggregate samples.
    #[error("{backend} backend does not produce a per-site breakdown")]
    NoSiteBreakdown {
        /// Backend that was asked for sites.
        backend: BackendKind,
    },

    /// The report sink failed to accept output.
    #[error("writing report: {0}")]
    Io(#[from] std::io::Error),

    /// JSON rendering failed.
    #[error("encoding report as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProbeError {
    /// Shorthand for [`ProbeError::UnsupportedPlatform`].
    pub fn unsupported(backend: BackendKind, reason: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            backend,
            reason: reason.into(),
        }
    }
}

/// Result alias with [`ProbeError`] as the default error.
pub type Result<T, E = ProbeError> = std::result::Result<T, E>;
