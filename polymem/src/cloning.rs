//! Cloning policies: how a type-erased value is duplicated or relocated to raw storage.
//!
//! Containers in this crate family only see a value through its capability set `I`
//! (usually `dyn Trait`). Whenever they need to copy such a value, or move it to a new
//! address through anything but a plain in-place shift, they ask the policy stored
//! next to the value.
//!
//! - [`VirtualCloning`]: the capability set itself knows how to clone (`I: PolyClone`).
//! - [`DelegateCloning`]: a function pointer specialised for the concrete type is captured
//!   at insertion, so `I` needs no cloning method at all.
//! - [`NoCloning`]: duplicating is refused with [`MemError::CloningNotSupported`].

use core::mem;
use core::ptr::{self, NonNull};

use crate::error::MemError;

/// Duplication and relocation operations a capability set may expose to [`VirtualCloning`].
///
/// Implemented for every `T: Clone`; a capability set opts in with a supertrait bound:
///
/// ```
/// use polymem::PolyClone;
///
/// trait Shape: PolyClone {
///     fn area(&self) -> f64;
/// }
/// ```
pub trait PolyClone {
    /// Writes a clone of `self` to `dst`.
    ///
    /// # Errors
    ///
    /// Implementations may refuse with [`MemError::CloningNotSupported`].
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of `size_of_val(self)` bytes, aligned to
    /// `align_of_val(self)`, and must not overlap `self`.
    unsafe fn poly_clone_to(&self, dst: NonNull<u8>) -> Result<(), MemError>;

    /// Relocates `self` to `dst`. Afterwards `self` is moved-from and must be neither used
    /// nor dropped.
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of `size_of_val(self)` bytes and aligned to
    /// `align_of_val(self)`. The regions may overlap.
    unsafe fn poly_move_to(&mut self, dst: NonNull<u8>) {
        let size = mem::size_of_val(self);
        let src = (self as *mut Self).cast::<u8>();
        // Safe: forwarded from the caller; `ptr::copy` tolerates overlapping regions
        unsafe { ptr::copy(src, dst.as_ptr(), size) };
    }
}

impl<T: Clone> PolyClone for T {
    unsafe fn poly_clone_to(&self, dst: NonNull<u8>) -> Result<(), MemError> {
        let value = self.clone();
        // Safe: the caller guarantees `dst` is valid and aligned for a `T`
        unsafe { dst.cast::<T>().as_ptr().write(value) };
        Ok(())
    }
}

/// A strategy for duplicating and relocating values known only through `I`.
///
/// One policy instance is stored per value. `Clone` on the policy duplicates the strategy,
/// never the value.
///
/// # Safety
///
/// On `Ok(())` both operations must leave a live value of the source's concrete type at
/// `dst`. `move_to` must additionally leave the source moved-from: the caller will neither use
/// nor drop it.
pub unsafe trait CloningPolicy<I: ?Sized>: Clone {
    /// Relocation through [`move_to`](Self::move_to) cannot fail, so containers may prefer
    /// it over copying when they relocate values.
    const NOEXCEPT_MOVABLE: bool;

    /// Writes a duplicate of `src` to `dst`.
    ///
    /// # Errors
    ///
    /// [`MemError::CloningNotSupported`] under a forbidding policy, or whatever the capability
    /// set reports.
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of `size_of_val(src)` bytes, aligned to
    /// `align_of_val(src)`, and must not overlap `src`. `src` must have been created for this
    /// policy instance.
    unsafe fn clone_to(&self, src: &I, dst: NonNull<u8>) -> Result<(), MemError>;

    /// Relocates the value at `src` to `dst`, possibly overlapping.
    ///
    /// # Errors
    ///
    /// [`MemError::CloningNotSupported`] under a forbidding policy. On error the source is
    /// untouched.
    ///
    /// # Safety
    ///
    /// As for [`clone_to`](Self::clone_to), except that the regions may overlap. On success
    /// the source must not be used or dropped again.
    unsafe fn move_to(&self, src: NonNull<I>, dst: NonNull<u8>) -> Result<(), MemError>;
}

/// Builds the policy instance for a concrete type `T` at insertion time.
pub trait PolicyFor<T>: Sized {
    /// The policy instance to store next to a `T`.
    fn for_type() -> Self;
}

/// Dynamic dispatch: cloning goes through the capability set's own [`PolyClone`] methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtualCloning;

impl<T> PolicyFor<T> for VirtualCloning {
    fn for_type() -> Self {
        VirtualCloning
    }
}

unsafe impl<I> CloningPolicy<I> for VirtualCloning
where
    I: ?Sized + PolyClone,
{
    const NOEXCEPT_MOVABLE: bool = true;

    unsafe fn clone_to(&self, src: &I, dst: NonNull<u8>) -> Result<(), MemError> {
        // Safe: requirements forwarded from the caller
        unsafe { src.poly_clone_to(dst) }
    }

    unsafe fn move_to(&self, mut src: NonNull<I>, dst: NonNull<u8>) -> Result<(), MemError> {
        // Safe: requirements forwarded from the caller, who owns the source exclusively
        unsafe { src.as_mut().poly_move_to(dst) };
        Ok(())
    }
}

type ErasedOp = unsafe fn(NonNull<u8>, NonNull<u8>);

/// Delegation: function pointers specialised for the concrete type are captured when the
/// value is inserted, so the capability set needs no cloning support.
///
/// With `NOEXCEPT_MOVE == false` containers relocate by cloning, which keeps their previous
/// contents intact should a clone panic halfway through a relocation pass.
#[derive(Clone, Copy)]
pub struct DelegateCloning<const NOEXCEPT_MOVE: bool = true> {
    clone: ErasedOp,
    relocate: ErasedOp,
}

unsafe fn clone_erased<T: Clone>(src: NonNull<u8>, dst: NonNull<u8>) {
    // Safe: both pointers address `T` storage, `src` a live value
    unsafe {
        let value = src.cast::<T>().as_ref().clone();
        dst.cast::<T>().as_ptr().write(value);
    }
}

unsafe fn relocate_erased<T>(src: NonNull<u8>, dst: NonNull<u8>) {
    // Safe: both pointers address `T` storage; overlapping is allowed by `ptr::copy`
    unsafe { ptr::copy(src.cast::<T>().as_ptr(), dst.cast::<T>().as_ptr(), 1) };
}

impl<T: Clone, const M: bool> PolicyFor<T> for DelegateCloning<M> {
    fn for_type() -> Self {
        DelegateCloning {
            clone: clone_erased::<T>,
            relocate: relocate_erased::<T>,
        }
    }
}

impl<const M: bool> core::fmt::Debug for DelegateCloning<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DelegateCloning")
            .field("noexcept_move", &M)
            .finish_non_exhaustive()
    }
}

unsafe impl<I: ?Sized, const M: bool> CloningPolicy<I> for DelegateCloning<M> {
    const NOEXCEPT_MOVABLE: bool = M;

    unsafe fn clone_to(&self, src: &I, dst: NonNull<u8>) -> Result<(), MemError> {
        let src = NonNull::from(src).cast::<u8>();
        // Safe: the captured function matches the concrete type behind `src`
        unsafe { (self.clone)(src, dst) };
        Ok(())
    }

    unsafe fn move_to(&self, src: NonNull<I>, dst: NonNull<u8>) -> Result<(), MemError> {
        // Safe: the captured function matches the concrete type behind `src`
        unsafe { (self.relocate)(src.cast::<u8>(), dst) };
        Ok(())
    }
}

/// Forbids duplication: every clone or policy-driven relocation fails with
/// [`MemError::CloningNotSupported`].
///
/// A container of values under this policy can still grow as long as nothing has to be
/// relocated, e.g. after an up-front `reserve`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoCloning;

impl<T> PolicyFor<T> for NoCloning {
    fn for_type() -> Self {
        NoCloning
    }
}

unsafe impl<I: ?Sized> CloningPolicy<I> for NoCloning {
    const NOEXCEPT_MOVABLE: bool = false;

    unsafe fn clone_to(&self, _src: &I, _dst: NonNull<u8>) -> Result<(), MemError> {
        Err(MemError::CloningNotSupported)
    }

    unsafe fn move_to(&self, _src: NonNull<I>, _dst: NonNull<u8>) -> Result<(), MemError> {
        Err(MemError::CloningNotSupported)
    }
}
