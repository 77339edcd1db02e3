use core::alloc::Layout;
use core::ptr::NonNull;

use polymem::{MemError, RawAllocator};

/// One owned allocation of the vector: descriptor region first, object region after it.
pub(crate) struct RawBlock<A: RawAllocator> {
    ptr: NonNull<u8>,
    layout: Layout,
    pub(crate) alloc: A,
}

impl<A: RawAllocator> RawBlock<A> {
    pub(crate) const fn empty(alloc: A) -> Self {
        Self {
            ptr: NonNull::dangling(),
            layout: Layout::new::<()>(),
            alloc,
        }
    }

    pub(crate) fn allocate(layout: Layout, alloc: A) -> Result<Self, MemError> {
        if layout.size() == 0 {
            return Ok(Self::empty(alloc));
        }
        let ptr = alloc
            .allocate(layout)
            .map_err(|_| MemError::alloc_failed(layout))?;
        log::trace!(
            "poly vector: block of {} bytes aligned to {} at {:p}",
            layout.size(),
            layout.align(),
            ptr
        );
        Ok(Self { ptr, layout, alloc })
    }

    pub(crate) fn base(&self) -> NonNull<u8> {
        self.ptr
    }

    pub(crate) fn size(&self) -> usize {
        self.layout.size()
    }

    pub(crate) fn align(&self) -> usize {
        self.layout.align()
    }
}

impl<A: RawAllocator> Drop for RawBlock<A> {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // Safe: the block was obtained from `self.alloc` with this layout
            unsafe { self.alloc.deallocate(self.ptr, self.layout) };
        }
    }
}
