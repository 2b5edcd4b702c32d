//! Allocation-tracing backend.
//!
//! Two states: `NotTracing` (no window) and `Tracing` (window opened by
//! `start`). Every block is stamped with the allocation epoch it was created
//! in and a window only counts blocks from its own epoch onwards, so nothing
//! allocated before `start` is visible, and freeing such a block after
//! `start` does not offset anything allocated since.
//!
//! The window is owned by this instance, so several tracers can run side by
//! side (e.g. in parallel tests) without observing each other's start.

use memprobe_alloc::Window;
use tracing::{debug, info};

use super::require_tracking_allocator;
use crate::backend::MemoryBackend;
use crate::error::{ProbeError, Result};
use crate::types::{sort_sites, AllocationSite, BackendKind, MemorySample, SiteKey};

/// Outstanding allocations per source line since [`MemoryBackend::start`].
#[derive(Clone, Debug, Default)]
pub struct AllocTracingBackend {
    window: Option<Window>,
}

impl AllocTracingBackend {
    /// A tracer in the `NotTracing` state.
    #[must_use]
    pub const fn new() -> Self {
        Self { window: None }
    }

    /// Whether `start` has been called.
    #[must_use]
    pub const fn is_tracing(&self) -> bool {
        self.window.is_some()
    }
}

impl MemoryBackend for AllocTracingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::AllocTracing
    }

    fn start(&mut self) -> Result<()> {
        require_tracking_allocator(BackendKind::AllocTracing)?;
        if self.window.is_some() {
            debug!("allocation tracing already started; keeping window");
            return Ok(());
        }
        let window = Window::open();
        info!(epoch = window.epoch(), "allocation tracing started");
        self.window = Some(window);
        Ok(())
    }

    fn sample(&mut self) -> Result<MemorySample> {
        let traced: u64 = self.snapshot_sites()?.iter().map(|s| s.size_bytes).sum();
        Ok(MemorySample::empty(BackendKind::AllocTracing).with_resident(traced))
    }

    fn snapshot_sites(&mut self) -> Result<Vec<AllocationSite>> {
        let window = self.window.as_ref().ok_or(ProbeError::TracingNotStarted)?;
        let mut sites: Vec<AllocationSite> = window
            .site_usage()
            .into_iter()
            .filter(|u| u.usage.bytes > 0)
            .map(|u| AllocationSite {
                key: u.key.map_or(SiteKey::Unattributed, SiteKey::from),
                size_bytes: u.usage.bytes,
                count: u.usage.count,
            })
            .collect();
        sort_sites(&mut sites);
        debug!(sites = sites.len(), "tracing snapshot");
        Ok(sites)
    }
}
