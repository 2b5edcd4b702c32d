//! Backend abstraction for memory probing.
//!
//! Implementors wrap one inspection mechanism and turn it into a
//! [`MemorySample`] (and, where the mechanism supports it, an ordered list of
//! [`AllocationSite`]s). The probe façade holds a `Box<dyn MemoryBackend>`,
//! so the backend is chosen at construction time from configuration.
//!
//! ## Contracts implementors should uphold
//! - `sample` reflects process state at call time and may be called any
//!   number of times.
//! - `sample` fails with `UnsupportedPlatform` when the underlying facility
//!   is absent; it must not panic.
//! - `snapshot_sites` returns sites sorted descending by `size_bytes`, ties
//!   in discovery order (see [`sort_sites`](crate::sort_sites)).
//! - `start` is idempotent; once started a backend stays started.

use crate::error::{ProbeError, Result};
use crate::types::{AllocationSite, BackendKind, MemorySample};

/// Minimal backend API the probe façade depends on.
///
/// ```ignore
/// use memprobe_core::{MemoryBackend, MemorySample, BackendKind};
/// struct Fixed;
/// impl MemoryBackend for Fixed {
///     fn kind(&self) -> BackendKind { BackendKind::Process }
///     fn sample(&mut self) -> memprobe_core::Result<MemorySample> {
///         Ok(MemorySample::empty(BackendKind::Process).with_resident(1))
///     }
/// }
/// ```
pub trait MemoryBackend {
    /// Which mechanism this backend implements.
    fn kind(&self) -> BackendKind;

    /// Take a measurement now.
    ///
    /// # Errors
    /// `UnsupportedPlatform` if the facility is unavailable; backend-specific
    /// lifecycle errors (e.g. `TracingNotStarted`).
    fn sample(&mut self) -> Result<MemorySample>;

    /// Begin observing. Tracing requires it; the census becomes relative;
    /// the OS backends ignore it.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Ordered per-site breakdown, where supported.
    fn snapshot_sites(&mut self) -> Result<Vec<AllocationSite>> {
        Err(ProbeError::NoSiteBreakdown {
            backend: self.kind(),
        })
    }
}
