//! Synthetic workload under measurement.
//!
//! The workload has a fixed memory shape: a map of `n` integer keys to their
//! decimal strings, plus one string joining every value with a single space.
//! Both halves stay alive inside [`Workload`] for as long as the caller holds
//! it, so a sample taken afterwards sees the whole footprint.
//!
//! The generator marks its allocation steps with `memprobe_alloc` tags, which
//! is what lets the heap-census and tracing backends attribute its bytes.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]

/// `WorkloadGenerator` and the `Workload` it produces.
pub mod generator;

pub use generator::{Workload, WorkloadGenerator, DEFAULT_SIZE};
