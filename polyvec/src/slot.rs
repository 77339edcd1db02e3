use core::alloc::Layout;
use core::mem;
use core::ptr::NonNull;

use polymem::CastFn;

/// Per-element descriptor, stored in the descriptor region at the start of the block.
///
/// The object address is kept as an offset from the block base, so descriptors survive a
/// bitwise move of the block contents as long as the offsets are updated.
pub(crate) struct Slot<I: ?Sized, P> {
    pub(crate) offset: usize,
    pub(crate) layout: Layout,
    pub(crate) cast: CastFn<I>,
    pub(crate) policy: P,
}

impl<I: ?Sized, P> Slot<I, P> {
    pub(crate) const SIZE: usize = mem::size_of::<Self>();

    /// Address of descriptor `index`.
    ///
    /// # Safety
    ///
    /// `base` must be the base of a block whose descriptor region holds more than `index`
    /// slots.
    pub(crate) unsafe fn at(base: NonNull<u8>, index: usize) -> NonNull<Self> {
        // Safe: in bounds of the descriptor region, per the caller
        unsafe { base.add(index * Self::SIZE).cast() }
    }

    /// Typed pointer to the described object.
    ///
    /// # Safety
    ///
    /// `base` must be the base of the block this descriptor lives in.
    pub(crate) unsafe fn object(&self, base: NonNull<u8>) -> NonNull<I> {
        // Safe: the offset lies inside the object region of this block
        (self.cast)(unsafe { base.add(self.offset) })
    }

    pub(crate) fn end(&self) -> usize {
        self.offset + self.layout.size()
    }
}
