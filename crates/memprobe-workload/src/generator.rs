// crates/memprobe-workload/src/generator.rs

//! Map-plus-join workload generator.
//! Produces a `Workload` with `n` entries and their space-joined values.

use std::collections::BTreeMap;

use memprobe_alloc::{SiteTag, TypeTag};
use memprobe_core::{ProbeError, Result};
use tracing::debug;

/// Workload size used when the caller does not pick one.
pub const DEFAULT_SIZE: u64 = 10_000;

/// Builds a [`Workload`] of a fixed size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkloadGenerator {
    n: u64,
}

impl Default for WorkloadGenerator {
    fn default() -> Self {
        Self { n: DEFAULT_SIZE }
    }
}

impl WorkloadGenerator {
    /// Generator for `n` entries.
    ///
    /// # Errors
    /// `InvalidArgument` if `n` is negative.
    pub fn new(n: i64) -> Result<Self> {
        let n = u64::try_from(n).map_err(|_| {
            ProbeError::InvalidArgument(format!("workload size must be non-negative, got {n}"))
        })?;
        Ok(Self { n })
    }

    /// Number of entries the workload will hold.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.n
    }

    /// Allocate the workload: `{i -> i.to_string()}` for `i in 0..n`, then
    /// every value joined with `' '` in key order.
    #[must_use]
    pub fn eat(&self) -> Workload {
        let strings = TypeTag::of::<String>();
        let nodes = TypeTag::of::<BTreeMap<u64, String>>();
        let value_site = SiteTag::here();
        let insert_site = SiteTag::here();

        let mut map = BTreeMap::new();
        for i in 0..self.n {
            let value = {
                let _ty = strings.enter();
                let _site = value_site.enter();
                i.to_string()
            };
            let _ty = nodes.enter();
            let _site = insert_site.enter();
            map.insert(i, value);
        }

        let join_site = SiteTag::here();
        let joined = {
            let _ty = strings.enter();
            let _site = join_site.enter();
            join_values(&map)
        };

        debug!(entries = map.len(), joined_len = joined.len(), "workload allocated");
        Workload { map, joined }
    }
}

/// Join values with single spaces, sized up front so it is one allocation.
fn join_values(map: &BTreeMap<u64, String>) -> String {
    let len = map.values().map(String::len).sum::<usize>() + map.len().saturating_sub(1);
    let mut out = String::with_capacity(len);
    for (idx, value) in map.values().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        out.push_str(value);
    }
    out
}

/// The live object under measurement: the map and its joined values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Workload {
    map: BTreeMap<u64, String>,
    joined: String,
}

impl Workload {
    /// Number of map entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Value stored for `key`.
    #[must_use]
    pub fn get(&self, key: u64) -> Option<&str> {
        self.map.get(&key).map(String::as_str)
    }

    /// All values joined with single spaces.
    #[must_use]
    pub fn joined(&self) -> &str {
        &self.joined
    }

    /// Number of space-separated tokens in [`joined`](Self::joined) (0 when empty).
    #[must_use]
    pub fn token_count(&self) -> usize {
        if self.joined.is_empty() {
            0
        } else {
            self.joined.split(' ').count()
        }
    }
}
