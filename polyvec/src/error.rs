use polymem::MemError;
use thiserror::Error;

/// Error types for `PolyVec` operations
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum PolyVecError {
    /// Index is beyond the current vector length
    #[error("Index {index} out of bounds for vector of length {length}")]
    IndexOutOfBounds {
        /// Index that was accessed
        index: usize,
        /// Current length of the vector
        length: usize,
    },
    /// Operation attempted on an empty vector
    #[error("Operation on empty vector")]
    EmptyVector,
    /// The requested layout cannot be represented or exceeds what the allocator can serve
    #[error("Capacity overflow: {requested} bytes requested, allocator limit is {max}")]
    CapacityOverflow {
        /// Number of bytes (or slots) the operation would need
        requested: usize,
        /// Largest size the allocator accepts
        max: usize,
    },
    /// Allocation or cloning failure reported by the storage layer
    #[error(transparent)]
    Mem(#[from] MemError),
}

impl PolyVecError {
    /// Whether the error comes from the active cloning policy refusing to duplicate.
    #[must_use]
    pub fn is_cloning_not_supported(&self) -> bool {
        matches!(self, PolyVecError::Mem(MemError::CloningNotSupported))
    }
}
