//! Concrete backends.
//!
//! Two talk to the OS (`rusage`, `process`); two read the tracking
//! allocator's counters (`census`, `tracer`).

/// Heap census over the tracking allocator, broken down by type, optionally relative.
pub mod census;
/// Live process counters via `sysinfo`.
pub mod process;
/// Peak resident size via `getrusage`.
pub mod rusage;
/// Per-line allocation tracing with an explicit start.
pub mod tracer;

pub use census::HeapCensusBackend;
pub use process::ProcessBackend;
pub use rusage::RusageBackend;
pub use tracer::AllocTracingBackend;

use crate::backend::MemoryBackend;
use crate::types::BackendKind;

/// Build a fresh backend for `kind`.
#[must_use]
pub fn make(kind: BackendKind) -> Box<dyn MemoryBackend> {
    match kind {
        BackendKind::Rusage => Box::new(RusageBackend),
        BackendKind::Process => Box::new(ProcessBackend::new()),
        BackendKind::HeapCensus => Box::new(HeapCensusBackend::new()),
        BackendKind::AllocTracing => Box::new(AllocTracingBackend::new()),
    }
}

/// Fail with `UnsupportedPlatform` unless the tracking allocator is live.
pub(crate) fn require_tracking_allocator(kind: BackendKind) -> crate::Result<()> {
    if memprobe_alloc::is_installed() {
        Ok(())
    } else {
        Err(crate::ProbeError::unsupported(
            kind,
            "memprobe_alloc::TrackingAllocator is not the #[global_allocator]",
        ))
    }
}
