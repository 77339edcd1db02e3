use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::fmt;
use core::mem::{self, MaybeUninit};
use core::ptr::{self, NonNull};

use crate::allocator::{Global, RawAllocator};
use crate::error::MemError;

/// Alignment of the inline region of a [`ByteBuffer`], and the default alignment of
/// allocations made through [`ByteBuffer::allocate`].
pub const INLINE_ALIGN: usize = 16;

/// Default inline threshold in bytes: four pointers.
pub const DEFAULT_INLINE_SIZE: usize = 4 * mem::size_of::<usize>();

/// Values placed inline may mutate through `&self` (`Cell`, atomics), so every pointer into
/// the region is derived from the `UnsafeCell`.
#[repr(C, align(16))]
struct InlineBytes<const N: usize>(UnsafeCell<[MaybeUninit<u8>; N]>);

impl<const N: usize> InlineBytes<N> {
    const fn uninit() -> Self {
        InlineBytes(UnsafeCell::new([MaybeUninit::uninit(); N]))
    }

    fn as_ptr(&self) -> Option<NonNull<u8>> {
        NonNull::new(self.0.get().cast::<u8>())
    }
}

enum Repr<const N: usize> {
    Empty,
    Inline { size: usize, bytes: InlineBytes<N> },
    Heap { ptr: NonNull<u8>, layout: Layout },
}

/// Raw storage with an inline threshold.
///
/// Requests of at most `N` bytes (and at most [`INLINE_ALIGN`] alignment) live inside the
/// buffer itself; larger ones come from the allocator `A`.
///
/// Invariants:
/// - `size() == 0` means nothing is allocated;
/// - `0 < size() <= N` with a small enough alignment means the data is inline;
/// - anything else is a heap block owned by the buffer, released on drop.
///
/// The buffer only manages bytes. Whoever constructs values in it is responsible for
/// destroying them before the bytes go away.
pub struct ByteBuffer<const N: usize = DEFAULT_INLINE_SIZE, A: RawAllocator = Global> {
    repr: Repr<N>,
    alloc: A,
}

impl<const N: usize> ByteBuffer<N, Global> {
    /// Creates an empty buffer backed by the global heap.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            repr: Repr::Empty,
            alloc: Global,
        }
    }

    /// Creates a buffer holding `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns `MemError::AllocFailed` if the heap allocation fails.
    pub fn with_size(n: usize) -> Result<Self, MemError> {
        let mut buffer = Self::new();
        buffer.allocate(n)?;
        Ok(buffer)
    }
}

impl<const N: usize, A: RawAllocator> ByteBuffer<N, A> {
    /// The inline threshold in bytes.
    pub const INLINE_SIZE: usize = N;

    /// Creates an empty buffer using `alloc` for large requests.
    pub const fn new_in(alloc: A) -> Self {
        Self {
            repr: Repr::Empty,
            alloc,
        }
    }

    /// Allocates `n` bytes aligned to [`INLINE_ALIGN`]. A request of zero bytes allocates one.
    ///
    /// # Errors
    ///
    /// - `MemError::AlreadyAllocated` if the buffer already holds an allocation;
    /// - `MemError::AllocFailed` if the heap allocation fails.
    pub fn allocate(&mut self, n: usize) -> Result<NonNull<u8>, MemError> {
        let layout = Layout::from_size_align(n.max(1), INLINE_ALIGN).map_err(|_| {
            MemError::InvalidLayout {
                size: n,
                align: INLINE_ALIGN,
            }
        })?;
        self.allocate_layout(layout)
    }

    /// Allocates storage for `layout`. Zero-sized layouts are rounded up to one byte.
    ///
    /// # Errors
    ///
    /// - `MemError::AlreadyAllocated` if the buffer already holds an allocation;
    /// - `MemError::AllocFailed` if the heap allocation fails.
    pub fn allocate_layout(&mut self, layout: Layout) -> Result<NonNull<u8>, MemError> {
        if self.size() != 0 {
            return Err(MemError::AlreadyAllocated { size: self.size() });
        }

        let size = layout.size().max(1);
        if size <= N && layout.align() <= INLINE_ALIGN {
            self.repr = Repr::Inline {
                size,
                bytes: InlineBytes::uninit(),
            };
        } else {
            let layout = Layout::from_size_align(size, layout.align().max(INLINE_ALIGN))
                .map_err(|_| MemError::InvalidLayout {
                    size,
                    align: layout.align(),
                })?;
            let ptr = self
                .alloc
                .allocate(layout)
                .map_err(|_| MemError::alloc_failed(layout))?;
            log::trace!("byte buffer: {} bytes on the heap at {:p}", size, ptr);
            self.repr = Repr::Heap { ptr, layout };
        }

        self.get_checked_mut()
    }

    /// Releases the allocation, if any. The buffer is empty afterwards.
    pub fn deallocate(&mut self) {
        if let Repr::Heap { ptr, layout } = mem::replace(&mut self.repr, Repr::Empty) {
            // Safe: the block was obtained from `self.alloc` with this very layout
            unsafe { self.alloc.deallocate(ptr, layout) };
        }
    }

    /// Number of bytes allocated; zero when empty.
    #[must_use]
    pub fn size(&self) -> usize {
        match &self.repr {
            Repr::Empty => 0,
            Repr::Inline { size, .. } => *size,
            Repr::Heap { layout, .. } => layout.size(),
        }
    }

    #[must_use]
    pub fn is_allocated(&self) -> bool {
        !matches!(self.repr, Repr::Empty)
    }

    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self.repr, Repr::Inline { .. })
    }

    /// Tells whether a request for `layout` would be served inline.
    #[must_use]
    pub fn fits_inline(layout: Layout) -> bool {
        layout.size().max(1) <= N && layout.align() <= INLINE_ALIGN
    }

    /// Address of the allocated bytes, or `None` when empty.
    #[must_use]
    pub fn get(&self) -> Option<NonNull<u8>> {
        match &self.repr {
            Repr::Empty => None,
            Repr::Inline { bytes, .. } => bytes.as_ptr(),
            Repr::Heap { ptr, .. } => Some(*ptr),
        }
    }

    /// Mutable address of the allocated bytes, or `None` when empty.
    pub fn get_mut(&mut self) -> Option<NonNull<u8>> {
        match &mut self.repr {
            Repr::Empty => None,
            Repr::Inline { bytes, .. } => bytes.as_ptr(),
            Repr::Heap { ptr, .. } => Some(*ptr),
        }
    }

    /// Address of the allocated bytes.
    ///
    /// # Errors
    ///
    /// Returns `MemError::Unallocated` when empty.
    pub fn get_checked(&self) -> Result<NonNull<u8>, MemError> {
        self.get().ok_or(MemError::Unallocated)
    }

    fn get_checked_mut(&mut self) -> Result<NonNull<u8>, MemError> {
        self.get_mut().ok_or(MemError::Unallocated)
    }

    /// The layout the current allocation satisfies, or `None` when empty.
    #[must_use]
    pub fn layout(&self) -> Option<Layout> {
        match &self.repr {
            Repr::Empty => None,
            Repr::Inline { size, .. } => Layout::from_size_align(*size, INLINE_ALIGN).ok(),
            Repr::Heap { layout, .. } => Some(*layout),
        }
    }

    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Copy construction: a new buffer with an allocation of the same size and alignment,
    /// using the allocator selected by `RawAllocator::select_on_copy`.
    ///
    /// The contents are not copied; the owner of the bytes clones its values into the new
    /// allocation itself.
    ///
    /// # Errors
    ///
    /// Returns `MemError::AllocFailed` if the heap allocation fails.
    pub fn clone_allocation(&self) -> Result<Self, MemError> {
        let mut copy = Self::new_in(self.alloc.select_on_copy());
        if let Some(layout) = self.layout() {
            copy.allocate_layout(layout)?;
        }
        Ok(copy)
    }

    /// Copy assignment: replaces the allocation with one of the same size and alignment as
    /// `source`'s, adopting `source`'s allocator when it propagates on copy.
    ///
    /// The new allocation is made before the old one is released; on error `self` is
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns `MemError::AllocFailed` if the heap allocation fails.
    pub fn assign_allocation_from(&mut self, source: &Self) -> Result<(), MemError> {
        let alloc = if A::PROPAGATION.on_copy_assign {
            source.alloc.clone()
        } else {
            self.alloc.clone()
        };
        let mut fresh = Self::new_in(alloc);
        if let Some(layout) = source.layout() {
            fresh.allocate_layout(layout)?;
        }
        *self = fresh;
        Ok(())
    }

    /// Move assignment: takes over `source`'s bytes, leaving `source` empty.
    ///
    /// A heap block is stolen when the allocators are interchangeable or `A` propagates on
    /// move. Inline payloads, and heap blocks that cannot be stolen, are copied into a fresh
    /// allocation of `self`.
    ///
    /// # Errors
    ///
    /// Returns `MemError::AllocFailed` if a copy is needed and the heap allocation fails; both
    /// buffers are unchanged in that case.
    pub fn take_from(&mut self, source: &mut Self) -> Result<(), MemError> {
        let propagate = A::PROPAGATION.on_move_assign;
        let can_steal = matches!(source.repr, Repr::Heap { .. })
            && (propagate || self.alloc == source.alloc);

        if can_steal {
            self.deallocate();
            self.repr = mem::replace(&mut source.repr, Repr::Empty);
            if propagate {
                self.alloc = source.alloc.clone();
            }
            return Ok(());
        }

        let Some(layout) = source.layout() else {
            self.deallocate();
            if propagate {
                self.alloc = source.alloc.clone();
            }
            return Ok(());
        };

        let mut fresh = Self::new_in(if propagate {
            source.alloc.clone()
        } else {
            self.alloc.clone()
        });
        let dst = fresh.allocate_layout(layout)?;
        let src = source.get_checked()?;
        // Safe: both regions hold at least `layout.size()` bytes and belong to distinct buffers
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), layout.size()) };
        source.deallocate();
        *self = fresh;
        Ok(())
    }

    /// Exchanges the contents of two buffers.
    ///
    /// Heap blocks change hands directly. The allocators are exchanged too when `A`
    /// propagates on swap.
    ///
    /// # Panics
    ///
    /// If `A` does not propagate on swap and the two allocators are not interchangeable:
    /// neither buffer could release the other's block.
    pub fn swap(&mut self, other: &mut Self) {
        if A::PROPAGATION.on_swap {
            mem::swap(&mut self.alloc, &mut other.alloc);
        } else {
            assert!(
                self.alloc == other.alloc,
                "swapping buffers whose allocators neither propagate nor compare equal"
            );
        }
        mem::swap(&mut self.repr, &mut other.repr);
    }
}

impl<const N: usize> Default for ByteBuffer<N, Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, A: RawAllocator> Drop for ByteBuffer<N, A> {
    fn drop(&mut self) {
        self.deallocate();
    }
}

impl<const N: usize, A: RawAllocator> fmt::Debug for ByteBuffer<N, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("size", &self.size())
            .field("inline", &self.is_inline())
            .field("threshold", &N)
            .finish()
    }
}
