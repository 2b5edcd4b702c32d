//! memprobe-alloc — a counting global allocator with allocation attribution.
//!
//! Rust has no runtime object graph to walk and no interpreter-level
//! allocation tracer, so this crate provides both facilities from the one
//! place every heap allocation passes through:
//!
//! - [`TrackingAllocator`] wraps another [`GlobalAlloc`](std::alloc::GlobalAlloc)
//!   and keeps process-wide live/peak byte counters,
//! - [`SiteTag`] / [`TypeTag`] attribute allocations made inside a guarded
//!   scope to a source line or a type name,
//! - [`heap_stats`], [`site_usage`] and [`type_usage`] read the counters back,
//! - a [`Window`] reads the same counters restricted to blocks allocated
//!   after it was opened.
//!
//! Install it in the final binary (or integration-test crate):
//!
//! ```ignore
//! use memprobe_alloc::TrackingAllocator;
//!
//! #[global_allocator]
//! static GLOBAL: TrackingAllocator = TrackingAllocator::system();
//! ```
//!
//! Tags are inert when the allocator is not installed, so libraries can mark
//! their allocations unconditionally.

#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

/// The `GlobalAlloc` wrapper that stamps and counts every block.
pub mod allocator;
/// Interning tables for site and type keys.
pub mod registry;
/// Process-wide counters and their read-side snapshots.
pub mod stats;
/// Scoped attribution tags (`SiteTag`, `TypeTag`) and their guards.
pub mod tag;
/// Usage restricted to blocks allocated after a point in time.
pub mod window;

pub use allocator::TrackingAllocator;
pub use registry::SiteKey;
pub use stats::{
    heap_stats, is_installed, site_usage, type_usage, HeapStats, SlotUsage, TagUsage, MAX_EPOCHS,
    MAX_TAGS,
};
pub use tag::{SiteTag, TagGuard, TypeTag};
pub use window::Window;
