//! Probe façade.
//!
//! Goals:
//! - Pick the backend once, at construction, from a [`BackendKind`].
//! - Give callers one surface (`start` / `sample` / `snapshot_sites`) no
//!   matter which mechanism is behind it.
//! - Keep all lifecycle state (the allocation window opened by `start`)
//!   inside the instance.

use std::fmt;

use tracing::debug;

use crate::backend::MemoryBackend;
use crate::backends;
use crate::error::Result;
use crate::types::{AllocationSite, BackendKind, MemorySample};

/// A memory probe bound to one backend.
pub struct MemoryProbe {
    backend: Box<dyn MemoryBackend>,
}

impl fmt::Debug for MemoryProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryProbe")
            .field("backend", &self.backend.kind())
            .finish()
    }
}

impl MemoryProbe {
    /// Probe backed by the built-in implementation of `kind`.
    #[must_use]
    pub fn new(kind: BackendKind) -> Self {
        Self::with_backend(backends::make(kind))
    }

    /// Probe backed by a caller-supplied backend.
    #[must_use]
    pub fn with_backend(backend: Box<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    /// Backend in use.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Begin observing (required before tracing snapshots; makes the census
    /// relative; no-op for the OS backends).
    pub fn start(&mut self) -> Result<()> {
        self.backend.start()
    }

    /// Take a measurement now.
    pub fn sample(&mut self) -> Result<MemorySample> {
        let sample = self.backend.sample()?;
        debug!(backend = %sample.backend, resident = ?sample.resident_bytes, peak = ?sample.peak_bytes, "sampled");
        Ok(sample)
    }

    /// Full per-site breakdown, descending by size.
    pub fn snapshot_sites(&mut self) -> Result<Vec<AllocationSite>> {
        self.backend.snapshot_sites()
    }

    /// The `limit` largest sites.
    pub fn top_sites(&mut self, limit: usize) -> Result<Vec<AllocationSite>> {
        let mut sites = self.snapshot_sites()?;
        sites.truncate(limit);
        Ok(sites)
    }
}
