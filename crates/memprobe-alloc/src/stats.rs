//! Process-wide allocation counters.
//!
//! Everything here is written from inside the allocator, so the write side is
//! lock-free atomics over fixed-size tables and never allocates.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::registry;
use crate::tag::Tags;

/// Number of attribution slots per table (slot 0 is "unattributed").
pub const MAX_TAGS: usize = 256;

/// Number of epochs with their own counter tables. Epoch 0 (before any
/// window was opened) has none; once the last epoch is reached it is shared
/// by every later window.
pub const MAX_EPOCHS: u32 = 16;

struct Slot {
    bytes: AtomicU64,
    count: AtomicU64,
}

impl Slot {
    const fn new() -> Self {
        Self {
            bytes: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn add(&self, size: u64) {
        self.bytes.fetch_add(size, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn sub(&self, size: u64) {
        self.bytes.fetch_sub(size, Ordering::Relaxed);
        self.count.fetch_sub(1, Ordering::Relaxed);
    }

    fn load(&self) -> SlotUsage {
        SlotUsage {
            bytes: self.bytes.load(Ordering::Relaxed),
            count: self.count.load(Ordering::Relaxed),
        }
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: Slot = Slot::new();

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_TABLE: [Slot; MAX_TAGS] = [EMPTY_SLOT; MAX_TAGS];

static SITE_SLOTS: [Slot; MAX_TAGS] = EMPTY_TABLE;
static TYPE_SLOTS: [Slot; MAX_TAGS] = EMPTY_TABLE;

// Row `e - 1` holds the blocks stamped with epoch `e` that are still live.
static EPOCH_SITE_SLOTS: [[Slot; MAX_TAGS]; MAX_EPOCHS as usize] =
    [EMPTY_TABLE; MAX_EPOCHS as usize];
static EPOCH_TYPE_SLOTS: [[Slot; MAX_TAGS]; MAX_EPOCHS as usize] =
    [EMPTY_TABLE; MAX_EPOCHS as usize];

static EPOCH: AtomicU32 = AtomicU32::new(0);

static INSTALLED: AtomicBool = AtomicBool::new(false);
static CURRENT_BYTES: AtomicU64 = AtomicU64::new(0);
static PEAK_BYTES: AtomicU64 = AtomicU64::new(0);
static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static DEALLOCATIONS: AtomicU64 = AtomicU64::new(0);

#[inline]
#[allow(clippy::cast_possible_truncation)]
const fn usize_to_u64(n: usize) -> u64 {
    n as u64
}

/// Which attribution table to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Table {
    Sites,
    Types,
}

#[inline]
fn epoch_row(table: Table, epoch: u32) -> Option<&'static [Slot; MAX_TAGS]> {
    let row = usize::try_from(epoch.checked_sub(1)?).ok()?;
    match table {
        Table::Sites => EPOCH_SITE_SLOTS.get(row),
        Table::Types => EPOCH_TYPE_SLOTS.get(row),
    }
}

/// Epoch new blocks are stamped with (0 until the first window opens).
#[inline]
pub(crate) fn current_epoch() -> u32 {
    EPOCH.load(Ordering::Relaxed)
}

/// Advance to a fresh epoch. `Ok(e)` when epoch `e` has never been stamped on
/// a block; `Err(last)` once the epochs are used up and `last` is shared.
pub(crate) fn advance_epoch() -> Result<u32, u32> {
    EPOCH
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |e| {
            (e < MAX_EPOCHS).then_some(e + 1)
        })
        .map(|prev| prev + 1)
}

/// Live usage of `slot` among blocks stamped with `epoch`.
pub(crate) fn epoch_slot(table: Table, epoch: u32, slot: u16) -> SlotUsage {
    epoch_row(table, epoch).map_or_else(SlotUsage::default, |row| {
        row[usize::from(slot) % MAX_TAGS].load()
    })
}

#[inline]
pub(crate) fn record_alloc(tags: Tags, epoch: u32, size: usize) {
    let size = usize_to_u64(size);
    if !INSTALLED.load(Ordering::Relaxed) {
        INSTALLED.store(true, Ordering::Relaxed);
    }
    let now = CURRENT_BYTES.fetch_add(size, Ordering::Relaxed) + size;
    PEAK_BYTES.fetch_max(now, Ordering::Relaxed);
    ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    SITE_SLOTS[usize::from(tags.site) % MAX_TAGS].add(size);
    TYPE_SLOTS[usize::from(tags.ty) % MAX_TAGS].add(size);
    if let Some(row) = epoch_row(Table::Sites, epoch) {
        row[usize::from(tags.site) % MAX_TAGS].add(size);
    }
    if let Some(row) = epoch_row(Table::Types, epoch) {
        row[usize::from(tags.ty) % MAX_TAGS].add(size);
    }
}

#[inline]
pub(crate) fn record_dealloc(tags: Tags, epoch: u32, size: usize) {
    let size = usize_to_u64(size);
    CURRENT_BYTES.fetch_sub(size, Ordering::Relaxed);
    DEALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    SITE_SLOTS[usize::from(tags.site) % MAX_TAGS].sub(size);
    TYPE_SLOTS[usize::from(tags.ty) % MAX_TAGS].sub(size);
    if let Some(row) = epoch_row(Table::Sites, epoch) {
        row[usize::from(tags.site) % MAX_TAGS].sub(size);
    }
    if let Some(row) = epoch_row(Table::Types, epoch) {
        row[usize::from(tags.ty) % MAX_TAGS].sub(size);
    }
}

pub(crate) fn site_slot(slot: u16) -> SlotUsage {
    SITE_SLOTS[usize::from(slot) % MAX_TAGS].load()
}

pub(crate) fn type_slot(slot: u16) -> SlotUsage {
    TYPE_SLOTS[usize::from(slot) % MAX_TAGS].load()
}

/// Global heap counters as seen by the tracking allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Live (allocated, not yet freed) payload bytes.
    pub current_bytes: u64,
    /// High-water mark of `current_bytes` since process start.
    pub peak_bytes: u64,
    /// Total number of allocations served.
    pub allocations: u64,
    /// Total number of deallocations served.
    pub deallocations: u64,
}

/// Outstanding bytes and block count charged to one slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotUsage {
    /// Live bytes.
    pub bytes: u64,
    /// Live blocks.
    pub count: u64,
}

impl SlotUsage {
    /// Field-wise sum.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self {
            bytes: self.bytes.saturating_add(other.bytes),
            count: self.count.saturating_add(other.count),
        }
    }

    /// `self - other` as a unit: `None` if either field would go negative.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match (
            self.bytes.checked_sub(other.bytes),
            self.count.checked_sub(other.count),
        ) {
            (Some(bytes), Some(count)) => Some(Self { bytes, count }),
            _ => None,
        }
    }
}

/// Usage of one slot together with its key (`None` for the unattributed slot).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagUsage<K> {
    /// Slot index in the table.
    pub slot: u16,
    /// Interned key, `None` for slot 0.
    pub key: Option<K>,
    /// Live bytes/blocks.
    pub usage: SlotUsage,
}

/// Returns `true` once at least one allocation went through [`TrackingAllocator`].
///
/// [`TrackingAllocator`]: crate::TrackingAllocator
#[must_use]
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::Relaxed)
}

/// Snapshot of the global counters.
#[must_use]
pub fn heap_stats() -> HeapStats {
    let current_bytes = CURRENT_BYTES.load(Ordering::Relaxed);
    // The peak is raised just after the current count; never report it below.
    let peak_bytes = PEAK_BYTES.load(Ordering::Relaxed).max(current_bytes);
    HeapStats {
        current_bytes,
        peak_bytes,
        allocations: ALLOCATIONS.load(Ordering::Relaxed),
        deallocations: DEALLOCATIONS.load(Ordering::Relaxed),
    }
}

/// Per-site usage: the unattributed slot first, then sites in registration order.
#[must_use]
pub fn site_usage() -> Vec<TagUsage<registry::SiteKey>> {
    collect_usage(registry::sites(), site_slot)
}

/// Per-type usage: the unattributed slot first, then types in registration order.
#[must_use]
pub fn type_usage() -> Vec<TagUsage<&'static str>> {
    collect_usage(registry::types(), type_slot)
}

pub(crate) fn collect_usage<K>(
    keys: Vec<K>,
    read: impl Fn(u16) -> SlotUsage,
) -> Vec<TagUsage<K>> {
    let mut out = Vec::with_capacity(keys.len() + 1);
    out.push(TagUsage {
        slot: 0,
        key: None,
        usage: read(0),
    });
    for (slot, key) in (1u16..).zip(keys) {
        out.push(TagUsage {
            slot,
            key: Some(key),
            usage: read(slot),
        });
    }
    out
}
