//! Interning tables mapping site/type keys to counter slots.
//!
//! Registration happens outside the allocator (when a tag is created), so a
//! plain `Mutex<Vec<_>>` is enough. Allocations made while the lock is held
//! only touch the lock-free counters, never the tables.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::stats::MAX_TAGS;

/// A source location allocations can be charged to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteKey {
    /// Source file as reported by `Location::file`.
    pub file: &'static str,
    /// 1-based line number.
    pub line: u32,
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

static SITES: Mutex<Vec<SiteKey>> = Mutex::new(Vec::new());
static TYPES: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

/// Intern `key`, returning its slot (`0` when the table is full).
fn intern<K: PartialEq + Copy + fmt::Debug>(table: &Mutex<Vec<K>>, key: K) -> u16 {
    let mut keys = table.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(pos) = keys.iter().position(|k| *k == key) {
        return slot_of(pos);
    }
    if keys.len() + 1 >= MAX_TAGS {
        drop(keys);
        warn!(?key, max = MAX_TAGS, "tag table full; charging to unattributed slot");
        return 0;
    }
    keys.push(key);
    slot_of(keys.len() - 1)
}

#[inline]
fn slot_of(pos: usize) -> u16 {
    u16::try_from(pos + 1).unwrap_or(0)
}

pub(crate) fn intern_site(key: SiteKey) -> u16 {
    intern(&SITES, key)
}

pub(crate) fn intern_type(name: &'static str) -> u16 {
    intern(&TYPES, name)
}

pub(crate) fn sites() -> Vec<SiteKey> {
    SITES.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

pub(crate) fn types() -> Vec<&'static str> {
    TYPES.lock().unwrap_or_else(PoisonError::into_inner).clone()
}
