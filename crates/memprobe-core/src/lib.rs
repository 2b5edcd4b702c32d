//! memprobe-core — memory samples, probe backends, and reporting.
//!
//! This crate defines the **stable boundary** used across memprobe crates:
//! - the data model (`MemorySample`, `AllocationSite`, `BackendKind`),
//! - the crate error (`ProbeError`),
//! - the **backend-agnostic** probe façade over four interchangeable
//!   backends (`rusage`, `process`, `heap-census`, `alloc-tracing`), and
//! - the `Reporter` that renders samples and site lists.
//!
//! ```no_run
//! use memprobe_core::{BackendKind, MemoryProbe, OutputFormat, Reporter};
//!
//! let mut probe = MemoryProbe::new(BackendKind::Process);
//! let sample = probe.sample()?;
//! Reporter::stdout(OutputFormat::Text).report(&sample)?;
//! # Ok::<(), memprobe_core::ProbeError>(())
//! ```
//!
//! The `heap-census` and `alloc-tracing` backends read the counters kept by
//! `memprobe_alloc::TrackingAllocator`; they report `UnsupportedPlatform`
//! unless the final binary installs it as its `#[global_allocator]`.

#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Small, explicit allowlist to keep docs readable and APIs ergonomic.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]

/// Minimal backend trait the probe façade depends on.
pub mod backend;
/// The four concrete backends and the kind → backend factory.
pub mod backends;
/// Crate error type.
pub mod error;
/// Probe façade: backend selection at construction, sampling, site snapshots.
pub mod probe;
/// Human-readable / JSON rendering of samples and site lists.
pub mod report;
/// Canonical data types shared across the workspace.
pub mod types;

// ---- Re-exports for workspace compatibility ----
pub use backend::*;
pub use error::*;
pub use probe::*;
pub use report::*;
pub use types::*;

/// Commonly-used items for quick imports.
///
/// ```rust
/// use memprobe_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        backend::MemoryBackend,
        error::{ProbeError, Result},
        probe::MemoryProbe,
        report::{OutputFormat, Reporter},
        types::*,
    };
}
