use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr;

use crate::allocator::{Global, RawAllocator};
use crate::buffer::{ByteBuffer, DEFAULT_INLINE_SIZE};
use crate::cloning::{CloningPolicy, PolicyFor, VirtualCloning};
use crate::coerce::{cast_fn, CastFn, Coerce};
use crate::error::MemError;

struct Held<I: ?Sized, P> {
    cast: CastFn<I>,
    policy: P,
}

impl<I: ?Sized, P: Clone> Clone for Held<I, P> {
    fn clone(&self) -> Self {
        Held {
            cast: self.cast,
            policy: self.policy.clone(),
        }
    }
}

/// Zero or one value seen through the capability set `I`, stored in a [`ByteBuffer`].
///
/// Values of at most `N` bytes live inline; larger ones take a single allocation from `A`.
/// Copies go through the cloning policy `P` captured when the value was stored.
///
/// ```
/// use polymem::{impl_coerce, PolyClone, PolyStorage};
///
/// trait Shape: PolyClone {
///     fn area(&self) -> f64;
/// }
/// impl_coerce!(Shape);
///
/// #[derive(Clone)]
/// struct Square(f64);
///
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.0 * self.0
///     }
/// }
///
/// let storage = PolyStorage::<dyn Shape>::new(Square(3.0)).unwrap();
/// let copy = storage.try_clone().unwrap();
/// assert_eq!(copy.get().unwrap().area(), 9.0);
/// ```
pub struct PolyStorage<
    I: ?Sized,
    P = VirtualCloning,
    const N: usize = DEFAULT_INLINE_SIZE,
    A: RawAllocator = Global,
> {
    buffer: ByteBuffer<N, A>,
    held: Option<Held<I, P>>,
    _owns: PhantomData<I>,
}

impl<I: ?Sized, P, const N: usize> PolyStorage<I, P, N, Global> {
    /// Creates an empty storage backed by the global heap.
    #[must_use]
    pub const fn empty() -> Self {
        Self::empty_in(Global)
    }

    /// Stores `value`, inline when it is small enough.
    ///
    /// # Errors
    ///
    /// Returns `MemError::AllocFailed` if `value` needs the heap and the allocation fails.
    pub fn new<T>(value: T) -> Result<Self, MemError>
    where
        I: Coerce<T>,
        P: PolicyFor<T>,
    {
        Self::new_in(value, Global)
    }
}

impl<I: ?Sized, P, const N: usize, A: RawAllocator> PolyStorage<I, P, N, A> {
    pub const fn empty_in(alloc: A) -> Self {
        Self {
            buffer: ByteBuffer::new_in(alloc),
            held: None,
            _owns: PhantomData,
        }
    }

    /// Stores `value`, taking heap storage from `alloc` if needed.
    ///
    /// # Errors
    ///
    /// Returns `MemError::AllocFailed` if the allocation fails.
    pub fn new_in<T>(value: T, alloc: A) -> Result<Self, MemError>
    where
        I: Coerce<T>,
        P: PolicyFor<T>,
    {
        let mut storage = Self::empty_in(alloc);
        storage.emplace(value)?;
        Ok(storage)
    }

    fn emplace<T>(&mut self, value: T) -> Result<(), MemError>
    where
        I: Coerce<T>,
        P: PolicyFor<T>,
    {
        debug_assert!(self.held.is_none());
        let dst = self.buffer.allocate_layout(Layout::new::<T>())?;
        // Safe: the allocation was just made for the layout of `T`
        unsafe { dst.cast::<T>().as_ptr().write(value) };
        self.held = Some(Held {
            cast: cast_fn::<T, I>(),
            policy: P::for_type(),
        });
        log::trace!(
            "poly storage: {} bytes placed {}",
            mem::size_of::<T>(),
            if self.buffer.is_inline() { "inline" } else { "on the heap" }
        );
        Ok(())
    }

    /// Destroys the held value and releases the storage, leaving `self` empty.
    pub fn reset(&mut self) {
        if let Some(held) = self.held.take() {
            if let Some(ptr) = self.buffer.get_mut() {
                // Safe: the buffer holds a live value of the type the cast was made for
                unsafe { ptr::drop_in_place((held.cast)(ptr).as_ptr()) };
            }
        }
        self.buffer.deallocate();
    }

    /// Replaces the held value, if any, with `value`.
    ///
    /// # Errors
    ///
    /// Returns `MemError::AllocFailed` if the new value needs the heap and the allocation
    /// fails. The storage is empty in that case.
    pub fn replace<T>(&mut self, value: T) -> Result<(), MemError>
    where
        I: Coerce<T>,
        P: PolicyFor<T>,
    {
        self.reset();
        self.emplace(value)
    }

    #[must_use]
    pub fn get(&self) -> Option<&I> {
        let held = self.held.as_ref()?;
        let ptr = self.buffer.get()?;
        // Safe: a held value is alive for as long as `self` is borrowed
        Some(unsafe { (held.cast)(ptr).as_ref() })
    }

    pub fn get_mut(&mut self) -> Option<&mut I> {
        let cast = self.held.as_ref()?.cast;
        let ptr = self.buffer.get_mut()?;
        // Safe: as in `get`, with `self` borrowed exclusively
        Some(unsafe { cast(ptr).as_mut() })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_none()
    }

    /// Whether the held value lives inside the storage object itself.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.buffer.is_inline()
    }

    #[must_use]
    pub fn allocator(&self) -> &A {
        self.buffer.allocator()
    }

    /// Exchanges the held values of two storages.
    ///
    /// # Panics
    ///
    /// Under the same condition as [`ByteBuffer::swap`].
    pub fn swap(&mut self, other: &mut Self) {
        self.buffer.swap(&mut other.buffer);
        mem::swap(&mut self.held, &mut other.held);
    }
}

impl<I, P, const N: usize, A> PolyStorage<I, P, N, A>
where
    I: ?Sized,
    P: CloningPolicy<I>,
    A: RawAllocator,
{
    fn clone_into(&self, mut buffer: ByteBuffer<N, A>) -> Result<Self, MemError> {
        let held = match (&self.held, self.get()) {
            (Some(held), Some(src)) => {
                let dst = buffer.get_mut().ok_or(MemError::Unallocated)?;
                // Safe: `buffer` was allocated with the layout of the held value
                unsafe { held.policy.clone_to(src, dst)? };
                Some(held.clone())
            }
            _ => None,
        };
        Ok(Self {
            buffer,
            held,
            _owns: PhantomData,
        })
    }

    /// Copy construction through the cloning policy.
    ///
    /// # Errors
    ///
    /// - `MemError::CloningNotSupported` under a forbidding policy;
    /// - `MemError::AllocFailed` if the copy needs the heap and the allocation fails.
    pub fn try_clone(&self) -> Result<Self, MemError> {
        self.clone_into(self.buffer.clone_allocation()?)
    }

    /// Copy assignment. The allocator follows `source` only if it propagates on copy.
    ///
    /// # Errors
    ///
    /// As for [`try_clone`](Self::try_clone). On error `self` is unchanged.
    pub fn try_clone_from(&mut self, source: &Self) -> Result<(), MemError> {
        let mut buffer = ByteBuffer::new_in(self.buffer.allocator().clone());
        buffer.assign_allocation_from(&source.buffer)?;
        *self = source.clone_into(buffer)?;
        Ok(())
    }

    /// Move assignment honouring the allocator's propagation rules.
    ///
    /// A heap block changes hands when `A` propagates on move or both allocators compare
    /// equal. Otherwise (inline value, or allocators that cannot share blocks) the value is
    /// relocated through the cloning policy.
    ///
    /// # Errors
    ///
    /// `MemError::CloningNotSupported` if relocation is needed under a forbidding policy,
    /// or `MemError::AllocFailed`. On error `self` is unchanged and `source` is dropped
    /// with its value.
    pub fn assign_from(&mut self, mut source: Self) -> Result<(), MemError> {
        let propagate = A::PROPAGATION.on_move_assign;
        let steal = !source.buffer.is_inline()
            && (propagate || self.buffer.allocator() == source.buffer.allocator());

        let Some(held) = source.held.take() else {
            self.reset();
            return self.buffer.take_from(&mut source.buffer);
        };

        if steal {
            self.reset();
            self.buffer.take_from(&mut source.buffer)?;
            self.held = Some(held);
            return Ok(());
        }

        let layout = source.buffer.layout().ok_or(MemError::Unallocated)?;
        let alloc = if propagate {
            source.buffer.allocator().clone()
        } else {
            self.buffer.allocator().clone()
        };
        let mut fresh = ByteBuffer::new_in(alloc);
        let dst = fresh.allocate_layout(layout)?;
        let src = source.buffer.get_mut().ok_or(MemError::Unallocated)?;

        // Safe: `fresh` is a distinct allocation with the layout of the value
        if let Err(err) = unsafe { held.policy.move_to((held.cast)(src), dst) } {
            source.held = Some(held);
            return Err(err);
        }

        self.reset();
        self.buffer = fresh;
        self.held = Some(held);
        Ok(())
    }
}

impl<I, P, const N: usize, A> Clone for PolyStorage<I, P, N, A>
where
    I: ?Sized,
    P: CloningPolicy<I>,
    A: RawAllocator,
{
    /// # Panics
    ///
    /// If [`try_clone`](Self::try_clone) fails, e.g. under a forbidding policy.
    fn clone(&self) -> Self {
        self.try_clone()
            .unwrap_or_else(|err| panic!("cloning polymorphic storage: {err}"))
    }
}

impl<I: ?Sized, P, const N: usize> Default for PolyStorage<I, P, N, Global> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<I: ?Sized, P, const N: usize, A: RawAllocator> Drop for PolyStorage<I, P, N, A> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<I: ?Sized, P, const N: usize, A: RawAllocator> fmt::Debug for PolyStorage<I, P, N, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolyStorage")
            .field("empty", &self.is_empty())
            .field("inline", &self.is_inline())
            .field("bytes", &self.buffer.size())
            .finish()
    }
}
