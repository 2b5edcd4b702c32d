//! Scoped attribution tags.
//!
//! A tag is interned once (cheap to copy afterwards) and activated for the
//! current thread with [`SiteTag::enter`] / [`TypeTag::enter`]. The returned
//! guard restores the previous tag on drop, so scopes nest.

use std::cell::Cell;
use std::marker::PhantomData;
use std::panic::Location;

use crate::registry::{self, SiteKey};
use crate::stats::{self, SlotUsage};

/// Tags stamped into each block header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub(crate) struct Tags {
    pub(crate) site: u16,
    pub(crate) ty: u16,
}

impl Tags {
    const UNTAGGED: Self = Self { site: 0, ty: 0 };
}

thread_local! {
    static CURRENT: Cell<Tags> = const { Cell::new(Tags::UNTAGGED) };
}

/// Tags active on this thread (untagged during thread teardown).
#[inline]
pub(crate) fn current_tags() -> Tags {
    CURRENT.try_with(Cell::get).unwrap_or(Tags::UNTAGGED)
}

fn swap_tags(f: impl FnOnce(Tags) -> Tags) -> Tags {
    CURRENT
        .try_with(|cell| {
            let prev = cell.get();
            cell.set(f(prev));
            prev
        })
        .unwrap_or(Tags::UNTAGGED)
}

/// Restores the previously active tags when dropped.
#[must_use = "the tag is only active while the guard is alive"]
#[derive(Debug)]
pub struct TagGuard {
    prev: Tags,
    // Tags are per-thread; the guard must be dropped on the thread that made it.
    _not_send: PhantomData<*const ()>,
}

impl Drop for TagGuard {
    fn drop(&mut self) {
        let prev = self.prev;
        let _ = CURRENT.try_with(|cell| cell.set(prev));
    }
}

/// Charges allocations to a source line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SiteTag {
    slot: u16,
    key: SiteKey,
}

impl SiteTag {
    /// Tag for the caller's source line.
    #[track_caller]
    #[must_use]
    pub fn here() -> Self {
        let loc = Location::caller();
        Self::at(loc.file(), loc.line())
    }

    /// Tag for an explicit `file:line`.
    #[must_use]
    pub fn at(file: &'static str, line: u32) -> Self {
        let key = SiteKey { file, line };
        Self {
            slot: registry::intern_site(key),
            key,
        }
    }

    /// Interned key.
    #[must_use]
    pub const fn key(&self) -> SiteKey {
        self.key
    }

    /// Activate this site for the current thread until the guard drops.
    pub fn enter(&self) -> TagGuard {
        let slot = self.slot;
        TagGuard {
            prev: swap_tags(|t| Tags { site: slot, ..t }),
            _not_send: PhantomData,
        }
    }

    /// Live bytes/blocks currently charged to this site.
    #[must_use]
    pub fn usage(&self) -> SlotUsage {
        stats::site_slot(self.slot)
    }
}

/// Charges allocations to a type name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeTag {
    slot: u16,
    name: &'static str,
}

impl TypeTag {
    /// Tag named after `T` (via `std::any::type_name`).
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    /// Tag with an explicit name.
    #[must_use]
    pub fn named(name: &'static str) -> Self {
        Self {
            slot: registry::intern_type(name),
            name,
        }
    }

    /// Interned name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Activate this type for the current thread until the guard drops.
    pub fn enter(&self) -> TagGuard {
        let slot = self.slot;
        TagGuard {
            prev: swap_tags(|t| Tags { ty: slot, ..t }),
            _not_send: PhantomData,
        }
    }

    /// Live bytes/blocks currently charged to this type.
    #[must_use]
    pub fn usage(&self) -> SlotUsage {
        stats::type_slot(self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_nest_and_restore() {
        let outer = SiteTag::at("tag_test.rs", 1);
        let inner = SiteTag::at("tag_test.rs", 2);
        let ty = TypeTag::named("tag_test::Thing");

        assert_eq!(current_tags(), Tags::UNTAGGED);
        {
            let _o = outer.enter();
            assert_eq!(current_tags().site, outer.slot);
            {
                let _i = inner.enter();
                let _t = ty.enter();
                assert_eq!(current_tags().site, inner.slot);
                assert_eq!(current_tags().ty, ty.slot);
            }
            assert_eq!(current_tags().site, outer.slot);
            assert_eq!(current_tags().ty, 0);
        }
        assert_eq!(current_tags(), Tags::UNTAGGED);
    }

    #[test]
    fn here_captures_caller_line() {
        let line = line!() + 1;
        let tag = SiteTag::here();
        assert_eq!(tag.key().line, line);
        assert!(tag.key().file.ends_with("tag.rs"));
    }

    #[test]
    fn type_tag_uses_type_name() {
        let tag = TypeTag::of::<Vec<u8>>();
        assert!(tag.name().contains("Vec<u8>"));
    }
}
