//! Tracking allocator.
//!
//! Every block is over-allocated by a small header holding the attribution
//! tags that were active when it was created and the epoch it was created in.
//! On free the header is read back so the bytes are released from the same
//! site/type slot and epoch they were charged to, regardless of which thread
//! or scope drops the value.
//!
//! `realloc` goes to the inner allocator (so in-place growth stays in place)
//! and re-charges the block to the caller's current tags and epoch.

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr;

use crate::stats::{current_epoch, record_alloc, record_dealloc};
use crate::tag::{current_tags, Tags};

/// Stamped at the start of every block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
struct Header {
    tags: Tags,
    epoch: u32,
}

impl Header {
    fn now() -> Self {
        Self {
            tags: current_tags(),
            epoch: current_epoch(),
        }
    }
}

/// Smallest header in front of each block; must hold a `Header`.
const MIN_HEADER: usize = 16;

/// Header length for a given alignment (a multiple of `align`).
#[inline]
const fn header_len(align: usize) -> usize {
    if align > MIN_HEADER {
        align
    } else {
        MIN_HEADER
    }
}

/// Outer layout (header + payload) and the header length.
#[inline]
fn padded(layout: Layout) -> Option<(Layout, usize)> {
    let header = header_len(layout.align());
    let size = layout.size().checked_add(header)?;
    Layout::from_size_align(size, layout.align())
        .ok()
        .map(|outer| (outer, header))
}

/// Counting wrapper around an inner allocator (the system allocator by default).
#[derive(Debug, Default)]
pub struct TrackingAllocator<A = System> {
    inner: A,
}

impl TrackingAllocator<System> {
    /// Wrap the system allocator.
    #[must_use]
    pub const fn system() -> Self {
        Self { inner: System }
    }
}

impl<A> TrackingAllocator<A> {
    /// Wrap an arbitrary inner allocator.
    #[must_use]
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

impl<A: GlobalAlloc> TrackingAllocator<A> {
    /// Stamp `base` with the current tags and epoch, count it, and return the
    /// payload pointer.
    ///
    /// # Safety
    /// `base` must be null or point to a block of at least `header` bytes.
    #[inline]
    unsafe fn finish_alloc(base: *mut u8, header: usize, size: usize) -> *mut u8 {
        if base.is_null() {
            return base;
        }
        let stamp = Header::now();
        // SAFETY: the block is at least `header >= size_of::<Header>()` bytes long.
        unsafe { base.cast::<Header>().write_unaligned(stamp) };
        record_alloc(stamp.tags, stamp.epoch, size);
        // SAFETY: `header` is within the block and keeps the payload aligned.
        unsafe { base.add(header) }
    }

    /// Read the stamp of a block previously returned by `alloc`.
    ///
    /// # Safety
    /// `base` must be the start of a live block written by `finish_alloc`.
    #[inline]
    unsafe fn read_header(base: *mut u8) -> Header {
        // SAFETY: guaranteed by the caller.
        unsafe { base.cast::<Header>().read_unaligned() }
    }
}

// SAFETY: all requests are forwarded to `inner` with a layout that keeps the
// caller's alignment; the returned pointer is offset by a multiple of it.
unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let Some((outer, header)) = padded(layout) else {
            return ptr::null_mut();
        };
        // SAFETY: `outer` has non-zero size (header > 0).
        let base = unsafe { self.inner.alloc(outer) };
        // SAFETY: `base` came from `inner.alloc(outer)`.
        unsafe { Self::finish_alloc(base, header, layout.size()) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let Some((outer, header)) = padded(layout) else {
            return ptr::null_mut();
        };
        // SAFETY: `outer` has non-zero size (header > 0).
        let base = unsafe { self.inner.alloc_zeroed(outer) };
        // SAFETY: `base` came from `inner.alloc_zeroed(outer)`.
        unsafe { Self::finish_alloc(base, header, layout.size()) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // A layout that could not be padded was never handed out.
        let Some((outer, header)) = padded(layout) else {
            return;
        };
        // SAFETY: `ptr` was returned by `alloc` for this layout, so the header
        // sits `header` bytes before it inside the same block.
        let base = unsafe { ptr.sub(header) };
        // SAFETY: the header was written by `finish_alloc`.
        let stamp = unsafe { Self::read_header(base) };
        record_dealloc(stamp.tags, stamp.epoch, layout.size());
        // SAFETY: `base`/`outer` match the original inner allocation.
        unsafe { self.inner.dealloc(base, outer) };
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let Some((outer, header)) = padded(layout) else {
            return ptr::null_mut();
        };
        let Some((new_outer, _)) = Layout::from_size_align(new_size, layout.align())
            .ok()
            .and_then(padded)
        else {
            return ptr::null_mut();
        };
        // SAFETY: `ptr` was returned by `alloc` for `layout`.
        let base = unsafe { ptr.sub(header) };
        // SAFETY: the header was written by `finish_alloc`.
        let old = unsafe { Self::read_header(base) };
        // SAFETY: `base`/`outer` match the original allocation and `new_outer`
        // is a valid layout with the same alignment.
        let moved = unsafe { self.inner.realloc(base, outer, new_outer.size()) };
        if moved.is_null() {
            // The old block is untouched and still charged where it was.
            return moved;
        }
        record_dealloc(old.tags, old.epoch, layout.size());
        // SAFETY: `moved` is a live block of `new_outer.size()` bytes.
        unsafe { Self::finish_alloc(moved, header, new_size) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_keeps_alignment() {
        for shift in 0..12 {
            let align = 1usize << shift;
            let h = header_len(align);
            assert_eq!(h % align, 0, "header {h} must be a multiple of {align}");
            assert!(h >= std::mem::size_of::<Header>());
        }
    }

    #[test]
    fn realloc_keeps_payload_and_recharges_site() {
        use crate::tag::SiteTag;

        let a = TrackingAllocator::system();
        let site = SiteTag::at("allocator_test.rs", 1);
        let small = Layout::from_size_align(16, 8).unwrap();
        let _s = site.enter();

        unsafe {
            let p = a.alloc(small);
            assert!(!p.is_null());
            assert_eq!(p as usize % 8, 0);
            for i in 0..16u8 {
                p.add(usize::from(i)).write(i);
            }
            assert_eq!(site.usage().bytes, 16);

            let q = a.realloc(p, small, 4096);
            assert!(!q.is_null());
            assert_eq!(q as usize % 8, 0);
            for i in 0..16u8 {
                assert_eq!(q.add(usize::from(i)).read(), i);
            }
            assert_eq!(site.usage().bytes, 4096);
            assert_eq!(site.usage().count, 1);

            a.dealloc(q, Layout::from_size_align(4096, 8).unwrap());
        }
        assert_eq!(site.usage().bytes, 0);
        assert_eq!(site.usage().count, 0);
    }

    #[test]
    fn padded_rejects_overflow() {
        let layout = Layout::from_size_align(isize::MAX as usize - 4, 1).unwrap();
        assert!(padded(layout).is_none());
    }
}
