use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;

/// The allocator could not satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("memory allocation failed")
    }
}

/// How a container treats its allocator when the container itself is assigned or swapped.
///
/// When a flag is `false` the container keeps its own allocator and only the data travels.
/// When a flag is `true` the allocator travels together with the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Propagation {
    /// Copy-assignment replaces the destination allocator with a copy of the source one.
    pub on_copy_assign: bool,
    /// Move-assignment replaces the destination allocator with the source one.
    pub on_move_assign: bool,
    /// Swapping two containers swaps their allocators as well.
    pub on_swap: bool,
}

impl Propagation {
    /// Propagation behaviour of stateless allocators: nothing needs to be propagated on copy,
    /// while move and swap take the allocator along.
    pub const DEFAULT: Self = Self {
        on_copy_assign: false,
        on_move_assign: true,
        on_swap: true,
    };

    /// The allocator stays with its container no matter what.
    pub const NEVER: Self = Self {
        on_copy_assign: false,
        on_move_assign: false,
        on_swap: false,
    };

    /// The allocator always follows the data.
    pub const ALWAYS: Self = Self {
        on_copy_assign: true,
        on_move_assign: true,
        on_swap: true,
    };
}

impl Default for Propagation {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The allocator contract used by every container of this crate family.
///
/// Equality tells whether two instances are interchangeable: memory obtained from one may be
/// returned to the other. Containers consult it before handing a block over to another
/// container instance.
///
/// # Safety contract for implementors
///
/// `allocate` must return a block valid for `layout.size()` bytes and aligned to
/// `layout.align()`. Blocks must stay valid until passed to `deallocate` of an allocator that
/// compares equal to the one that produced them.
pub trait RawAllocator: Clone + PartialEq {
    /// Compile-time propagation policy of this allocator type.
    const PROPAGATION: Propagation = Propagation::DEFAULT;

    /// Allocates a block for `layout`. `layout.size()` is never zero.
    ///
    /// # Errors
    ///
    /// `AllocError` when the request cannot be satisfied.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Releases a block obtained from `allocate`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator (or an equal one) with
    /// the same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// The largest block size this allocator can theoretically hand out.
    fn max_size(&self) -> usize {
        isize::MAX as usize
    }

    /// The allocator a copy of a container should use.
    #[must_use]
    fn select_on_copy(&self) -> Self {
        self.clone()
    }
}

/// The global heap, through the `alloc` crate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Global;

impl RawAllocator for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() != 0, "zero-sized allocation request");
        // Safe: the layout has a non-zero size, as required by the contract of this method
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // Safe: forwarded from the caller, the block came from `alloc` with this layout
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}
