//! Allocation windows: usage restricted to blocks allocated after a point.
//!
//! Opening a window advances the global epoch. Every block carries the epoch
//! it was allocated in, and each epoch has its own counter tables, so a
//! window reads exactly the blocks allocated after it opened that are still
//! live. Frees of older blocks only touch older epochs and never show up.
//!
//! After [`MAX_EPOCHS`] windows the last epoch is shared. A window opened
//! then subtracts the shared epoch's counters as they stood when it opened,
//! which is exact for new blocks but lets frees of blocks from earlier
//! windows in that epoch cancel them out.

use tracing::{debug, warn};

use crate::registry::{self, SiteKey};
use crate::stats::{self, collect_usage, SlotUsage, Table, TagUsage, MAX_EPOCHS, MAX_TAGS};

/// A view of the heap counting only blocks allocated since [`Window::open`].
#[derive(Clone, Debug)]
pub struct Window {
    first: u32,
    // Counters of `first` already present at open; empty for a fresh epoch.
    site_base: Vec<SlotUsage>,
    type_base: Vec<SlotUsage>,
}

impl Window {
    /// Start a new window at the current point of the allocation timeline.
    #[must_use]
    pub fn open() -> Self {
        match stats::advance_epoch() {
            Ok(epoch) => {
                debug!(epoch, "allocation window opened");
                Self {
                    first: epoch,
                    site_base: Vec::new(),
                    type_base: Vec::new(),
                }
            }
            Err(last) => {
                warn!(
                    epoch = last,
                    max = MAX_EPOCHS,
                    "allocation epochs exhausted; window shares the last epoch"
                );
                Self {
                    first: last,
                    site_base: capture(Table::Sites, last),
                    type_base: capture(Table::Types, last),
                }
            }
        }
    }

    /// Epoch the window starts at.
    #[must_use]
    pub const fn epoch(&self) -> u32 {
        self.first
    }

    /// Live usage per site, restricted to the window. Same order as
    /// [`site_usage`](crate::site_usage).
    #[must_use]
    pub fn site_usage(&self) -> Vec<TagUsage<SiteKey>> {
        collect_usage(registry::sites(), |slot| {
            self.read(Table::Sites, &self.site_base, slot)
        })
    }

    /// Live usage per type, restricted to the window. Same order as
    /// [`type_usage`](crate::type_usage).
    #[must_use]
    pub fn type_usage(&self) -> Vec<TagUsage<&'static str>> {
        collect_usage(registry::types(), |slot| {
            self.read(Table::Types, &self.type_base, slot)
        })
    }

    /// Every live block allocated inside the window, whatever its tags.
    #[must_use]
    pub fn live(&self) -> SlotUsage {
        self.type_usage()
            .iter()
            .fold(SlotUsage::default(), |acc, u| acc.saturating_add(u.usage))
    }

    fn read(&self, table: Table, base: &[SlotUsage], slot: u16) -> SlotUsage {
        (self.first..=MAX_EPOCHS).fold(SlotUsage::default(), |acc, epoch| {
            let mut usage = stats::epoch_slot(table, epoch, slot);
            if epoch == self.first {
                if let Some(b) = base.get(usize::from(slot)) {
                    usage = usage.checked_sub(*b).unwrap_or_default();
                }
            }
            acc.saturating_add(usage)
        })
    }
}

fn capture(table: Table, epoch: u32) -> Vec<SlotUsage> {
    (0..MAX_TAGS)
        .map(|slot| stats::epoch_slot(table, epoch, u16::try_from(slot).unwrap_or(0)))
        .collect()
}
