//! Heap-census backend.
//!
//! The aggregate is the tracking allocator's live byte count; the breakdown
//! is one entry per `TypeTag` with live bytes, plus the untyped remainder.
//!
//! `start` makes the census relative: from then on both the aggregate and
//! the breakdown only count blocks allocated after it. The peak stays the
//! process-wide high-water mark.

use memprobe_alloc::{heap_stats, type_usage, TagUsage, Window};
use tracing::{debug, info};

use super::require_tracking_allocator;
use crate::backend::MemoryBackend;
use crate::error::Result;
use crate::types::{sort_sites, AllocationSite, BackendKind, MemorySample, SiteKey};

/// Live heap bytes as seen by `memprobe_alloc::TrackingAllocator`.
#[derive(Clone, Debug, Default)]
pub struct HeapCensusBackend {
    relative_to: Option<Window>,
}

impl HeapCensusBackend {
    /// An absolute census (everything live since process start).
    #[must_use]
    pub const fn new() -> Self {
        Self { relative_to: None }
    }

    /// Whether `start` has narrowed the census to later allocations.
    #[must_use]
    pub const fn is_relative(&self) -> bool {
        self.relative_to.is_some()
    }

    fn usage(&self) -> Vec<TagUsage<&'static str>> {
        self.relative_to
            .as_ref()
            .map_or_else(type_usage, Window::type_usage)
    }
}

impl MemoryBackend for HeapCensusBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::HeapCensus
    }

    fn start(&mut self) -> Result<()> {
        require_tracking_allocator(BackendKind::HeapCensus)?;
        if self.relative_to.is_none() {
            let window = Window::open();
            info!(epoch = window.epoch(), "heap census made relative");
            self.relative_to = Some(window);
        }
        Ok(())
    }

    fn sample(&mut self) -> Result<MemorySample> {
        require_tracking_allocator(BackendKind::HeapCensus)?;
        let stats = heap_stats();
        let live = self
            .relative_to
            .as_ref()
            .map_or(stats.current_bytes, |w| w.live().bytes);
        debug!(
            live,
            current = stats.current_bytes,
            peak = stats.peak_bytes,
            allocations = stats.allocations,
            relative = self.is_relative(),
            "heap census"
        );
        Ok(MemorySample::empty(BackendKind::HeapCensus)
            .with_resident(live)
            .with_peak(stats.peak_bytes.max(live)))
    }

    fn snapshot_sites(&mut self) -> Result<Vec<AllocationSite>> {
        require_tracking_allocator(BackendKind::HeapCensus)?;
        let mut sites: Vec<AllocationSite> = self
            .usage()
            .into_iter()
            .filter(|u| u.usage.bytes > 0)
            .map(|u| AllocationSite {
                key: u.key.map_or(SiteKey::Unattributed, |name| SiteKey::Type {
                    name: name.to_owned(),
                }),
                size_bytes: u.usage.bytes,
                count: u.usage.count,
            })
            .collect();
        sort_sites(&mut sites);
        Ok(sites)
    }
}
