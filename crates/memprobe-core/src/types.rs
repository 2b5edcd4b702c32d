//! Canonical core types used across the memprobe workspace.
//!
//! These live in `memprobe-core` and are re-exported at the crate root so
//! other crates can import via `memprobe_core::MemorySample`, etc.
//!
//! Serialized forms are kept flat and stable (serde, kebab-case enums) since
//! they are what the JSON report format emits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ProbeError;

/// Which inspection mechanism produced a sample.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// OS resource accounting (`getrusage`); peak resident size only.
    Rusage,
    /// Live process counters (`sysinfo`); resident + virtual size.
    Process,
    /// Tracking-allocator heap census, broken down by type.
    HeapCensus,
    /// Tracking-allocator outstanding bytes per source line since `start()`.
    AllocTracing,
}

impl BackendKind {
    /// Every backend, in display order.
    pub const ALL: [Self; 4] = [
        Self::Rusage,
        Self::Process,
        Self::HeapCensus,
        Self::AllocTracing,
    ];

    /// Stable short name (also the CLI/serde spelling).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rusage => "rusage",
            Self::Process => "process",
            Self::HeapCensus => "heap-census",
            Self::AllocTracing => "alloc-tracing",
        }
    }

    /// Whether the backend can produce a per-site (or per-type) breakdown.
    #[must_use]
    pub const fn has_sites(self) -> bool {
        matches!(self, Self::HeapCensus | Self::AllocTracing)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProbeError::InvalidArgument(format!("unknown backend {s:?}")))
    }
}

/// Point-in-time memory measurement. Immutable once created.
///
/// Figures a backend cannot observe are `None` rather than zero: the rusage
/// backend, for instance, only knows the peak. Backend-specific extras
/// (page faults, CPU time, RSS components) go in `counters`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemorySample {
    /// Backend that produced the sample.
    pub backend: BackendKind,
    /// Memory currently attributed to the process (RSS, or tracked heap bytes).
    pub resident_bytes: Option<u64>,
    /// Maximum resident size observed since process start.
    pub peak_bytes: Option<u64>,
    /// Virtual address-space size, where the backend exposes it.
    pub virtual_bytes: Option<u64>,
    /// Additional named figures; names ending in `_bytes` are sizes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub counters: BTreeMap<String, u64>,
}

impl MemorySample {
    /// Sample with no figures filled in.
    #[must_use]
    pub const fn empty(backend: BackendKind) -> Self {
        Self {
            backend,
            resident_bytes: None,
            peak_bytes: None,
            virtual_bytes: None,
            counters: BTreeMap::new(),
        }
    }

    /// Set the resident figure.
    #[must_use]
    pub fn with_resident(mut self, bytes: u64) -> Self {
        self.resident_bytes = Some(bytes);
        self
    }

    /// Set the peak figure.
    #[must_use]
    pub fn with_peak(mut self, bytes: u64) -> Self {
        self.peak_bytes = Some(bytes);
        self
    }

    /// Set the virtual-size figure.
    #[must_use]
    pub fn with_virtual(mut self, bytes: u64) -> Self {
        self.virtual_bytes = Some(bytes);
        self
    }

    /// Add (or replace) a named extra figure.
    #[must_use]
    pub fn with_counter(mut self, name: impl Into<String>, value: u64) -> Self {
        self.counters.insert(name.into(), value);
        self
    }
}

/// What an [`AllocationSite`] aggregates over.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SiteKey {
    /// A source line (allocation-tracing backend).
    Line {
        /// Source file.
        file: String,
        /// 1-based line.
        line: u32,
    },
    /// A type name (heap-census backend).
    Type {
        /// Fully qualified type name.
        name: String,
    },
    /// Allocations made outside any tagged scope.
    Unattributed,
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line { file, line } => write!(f, "{file}:{line}"),
            Self::Type { name } => f.write_str(name),
            Self::Unattributed => f.write_str("<unattributed>"),
        }
    }
}

impl From<memprobe_alloc::SiteKey> for SiteKey {
    fn from(k: memprobe_alloc::SiteKey) -> Self {
        Self::Line {
            file: k.file.to_owned(),
            line: k.line,
        }
    }
}

/// Aggregate outstanding allocations charged to one site at snapshot time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationSite {
    /// Source line, type, or the unattributed bucket.
    pub key: SiteKey,
    /// Outstanding bytes.
    pub size_bytes: u64,
    /// Outstanding blocks.
    pub count: u64,
}

impl AllocationSite {
    /// Mean block size (0 for an empty site).
    #[inline]
    #[must_use]
    pub const fn average_bytes(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.size_bytes / self.count
        }
    }
}

/// Order sites for reporting: descending by size, ties keep discovery order.
pub fn sort_sites(sites: &mut [AllocationSite]) {
    // `sort_by` is stable, which is what preserves discovery order on ties.
    sites.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
}
