use crate::error::{Error, Result};
use std::{
    alloc::{self, Layout},
    ops::Range,
    ptr::NonNull,
};

/// A fixed-size byte store, shared between one writer and many readers.
///
/// The arena never reallocates or moves. It does no synchronisation of its
/// own: callers partition it into a *published* prefix (read-only, shared)
/// and an *unpublished* suffix (touched only by the writer), moving the
/// boundary forward with release/acquire ordering.
///
/// Memory comes straight from the allocator's zeroed path, so large arenas
/// are not written to up front: the OS hands out zero pages as they are
/// first touched by the fill worker.
pub(crate) struct SampleArena {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the arena uniquely owns its allocation.
unsafe impl Send for SampleArena {}

// SAFETY: all access to the bytes goes through the unsafe `region` and
// `region_mut` methods, whose callers guarantee that no byte is written
// while any other thread may read or write it.
unsafe impl Sync for SampleArena {}

impl SampleArena {
    /// Allocates a zeroed arena of `len` bytes.
    ///
    /// Fails with [`Error::InsufficientMemory`] rather than aborting if the
    /// allocator cannot satisfy the request, or if `len` exceeds `limit`.
    pub(crate) fn new(len: usize, limit: Option<usize>) -> Result<Self> {
        let refuse = || Error::InsufficientMemory {
            requested: len as u64,
        };

        if limit.map_or(false, |limit| len > limit) {
            return Err(refuse());
        }

        if len == 0 {
            return Ok(Self {
                base: NonNull::dangling(),
                len,
            });
        }

        let layout = Layout::array::<u8>(len).map_err(|_| refuse())?;

        // SAFETY: `layout` has a non-zero size.
        let base = NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).ok_or_else(refuse)?;

        Ok(Self { base, len })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Shared view of `range`.
    ///
    /// # Safety
    /// No thread may write to any byte in `range` for the lifetime of the
    /// returned slice.
    pub(crate) unsafe fn region(&self, range: Range<usize>) -> &[u8] {
        assert!(range.start <= range.end && range.end <= self.len());

        std::slice::from_raw_parts(self.base().add(range.start), range.len())
    }

    /// Exclusive view of `range`.
    ///
    /// # Safety
    /// No other thread may read or write any byte in `range` for the
    /// lifetime of the returned slice.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn region_mut(&self, range: Range<usize>) -> &mut [u8] {
        assert!(range.start <= range.end && range.end <= self.len());

        std::slice::from_raw_parts_mut(self.base().add(range.start), range.len())
    }
}

impl Drop for SampleArena {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }

        // SAFETY: `base` was allocated in `new` with exactly this layout.
        unsafe {
            alloc::dealloc(self.base(), Layout::from_size_align_unchecked(self.len, 1));
        }
    }
}
