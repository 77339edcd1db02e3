use thiserror::Error;

/// Error types for buffer, cloning and storage operations
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum MemError {
    /// Storage was accessed before anything was allocated in it
    #[error("Accessing unallocated storage")]
    Unallocated,
    /// `allocate` was called on a buffer that still holds an allocation
    #[error("Storage already allocated: {size} bytes in use, deallocate first")]
    AlreadyAllocated {
        /// Size of the allocation currently held
        size: usize,
    },
    /// The allocator refused the request
    #[error("Allocation failed: {size} bytes aligned to {align}")]
    AllocFailed {
        /// Number of bytes requested
        size: usize,
        /// Requested alignment
        align: usize,
    },
    /// The active cloning policy does not allow duplicating or relocating values
    #[error("Cloning not supported by the active cloning policy")]
    CloningNotSupported,
    /// Size and alignment do not form a valid layout
    #[error("Invalid layout: {size} bytes aligned to {align}")]
    InvalidLayout {
        /// Requested size
        size: usize,
        /// Requested alignment
        align: usize,
    },
}

impl MemError {
    /// The error reported when the allocator refuses `layout`.
    #[must_use]
    pub fn alloc_failed(layout: core::alloc::Layout) -> Self {
        MemError::AllocFailed {
            size: layout.size(),
            align: layout.align(),
        }
    }
}
