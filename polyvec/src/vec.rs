use alloc::boxed::Box;
use core::alloc::Layout;
use core::fmt;
use core::iter;
use core::marker::PhantomData;
use core::mem;
use core::ops::{Bound, Index, IndexMut, RangeBounds};
use core::ptr;

use polymem::{
    cast_fn, CloningPolicy, Coerce, Global, MemError, PolicyFor, RawAllocator, VirtualCloning,
};

use crate::block::RawBlock;
use crate::error::PolyVecError;
use crate::iter::{Iter, IterMut};
use crate::layout::{self, align_up, align_up_in_block, Plan, Request, Uniform};
use crate::slot::Slot;

/// A growable sequence of heterogeneous values, all seen through the capability set `I`,
/// stored by value in one allocation.
///
/// Block layout: `[descriptor region][object region]`
/// - the descriptor region holds `capacity()` descriptors (offset, layout, cast, policy);
/// - the object region follows it, objects placed in order at the next suitably aligned
///   offset, up to the free-storage mark.
///
/// Growth re-lays out every element into a new block, moving them through `P` when its
/// relocation cannot fail and cloning them otherwise. A failed clone leaves the vector as it
/// was before the call.
///
/// Element references are invalidated by anything that may grow the block (`push`,
/// `insert`, `reserve`) and by `erase`.
pub struct PolyVec<I: ?Sized, P = VirtualCloning, A: RawAllocator = Global> {
    block: RawBlock<A>,
    len: usize,
    cap: usize,
    free: usize,
    avg_size: usize,
    _marker: PhantomData<(P, Box<I>)>,
}

impl<I: ?Sized, P> PolyVec<I, P, Global> {
    /// Creates an empty vector. Nothing is allocated until the first element arrives.
    #[must_use]
    pub const fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<I: ?Sized, P, A: RawAllocator> PolyVec<I, P, A> {
    /// Creates an empty vector that will allocate from `alloc`.
    pub const fn new_in(alloc: A) -> Self {
        Self {
            block: RawBlock::empty(alloc),
            len: 0,
            cap: 0,
            free: 0,
            avg_size: 1,
            _marker: PhantomData,
        }
    }

    fn from_plan(plan: &Plan, alloc: A, avg_size: usize) -> Result<Self, PolyVecError> {
        let block = RawBlock::allocate(plan.layout()?, alloc)?;
        Ok(Self {
            block,
            len: 0,
            cap: plan.capacity,
            free: plan.capacity * Slot::<I, P>::SIZE,
            avg_size,
            _marker: PhantomData,
        })
    }

    fn slot_layout() -> Layout {
        Layout::new::<Slot<I, P>>()
    }

    fn region_start(&self) -> usize {
        self.cap * Slot::<I, P>::SIZE
    }

    fn slot(&self, index: usize) -> &Slot<I, P> {
        debug_assert!(index < self.len);
        // Safe: descriptors below `len` are initialized
        unsafe { Slot::at(self.block.base(), index).as_ref() }
    }

    fn layouts(&self) -> impl Iterator<Item = Layout> + Clone + '_ {
        (0..self.len).map(move |index| self.slot(index).layout)
    }

    /// Returns the number of elements in the vector.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the vector contains no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of descriptor slots, i.e. how many elements fit before the next growth,
    /// provided their objects fit too.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Size of the whole block in bytes, both regions included.
    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.block.size()
    }

    /// Offset of the free-storage mark: bytes from the start of the block up to the end of
    /// the last object.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.free
    }

    /// Bytes left after the free-storage mark.
    #[must_use]
    pub fn available_bytes(&self) -> usize {
        self.block.size() - self.free
    }

    /// Running estimate of the object size used to size new blocks.
    #[must_use]
    pub fn avg_size(&self) -> usize {
        self.avg_size
    }

    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.block.alloc
    }

    /// Returns the element at `index`, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&I> {
        if index >= self.len {
            return None;
        }
        let base = self.block.base();
        // Safe: the element is live and borrowed through `self`
        Some(unsafe { self.slot(index).object(base).as_ref() })
    }

    /// Returns the element at `index` mutably, or `None` if out of bounds.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut I> {
        if index >= self.len {
            return None;
        }
        let base = self.block.base();
        // Safe: as in `get`, with `self` borrowed exclusively
        Some(unsafe { self.slot(index).object(base).as_mut() })
    }

    /// Bounds-checked access.
    ///
    /// # Errors
    ///
    /// Returns `PolyVecError::IndexOutOfBounds` if `index >= len()`.
    pub fn at(&self, index: usize) -> Result<&I, PolyVecError> {
        let length = self.len;
        self.get(index)
            .ok_or(PolyVecError::IndexOutOfBounds { index, length })
    }

    /// Bounds-checked mutable access.
    ///
    /// # Errors
    ///
    /// Returns `PolyVecError::IndexOutOfBounds` if `index >= len()`.
    pub fn at_mut(&mut self, index: usize) -> Result<&mut I, PolyVecError> {
        let length = self.len;
        self.get_mut(index)
            .ok_or(PolyVecError::IndexOutOfBounds { index, length })
    }

    #[must_use]
    pub fn front(&self) -> Option<&I> {
        self.get(0)
    }

    pub fn front_mut(&mut self) -> Option<&mut I> {
        self.get_mut(0)
    }

    #[must_use]
    pub fn back(&self) -> Option<&I> {
        self.len.checked_sub(1).and_then(|index| self.get(index))
    }

    pub fn back_mut(&mut self) -> Option<&mut I> {
        self.len.checked_sub(1).and_then(|index| self.get_mut(index))
    }

    pub fn iter(&self) -> Iter<'_, I, P> {
        Iter::new(self.block.base(), self.len)
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, I, P> {
        IterMut::new(self.block.base(), self.len)
    }

    /// Removes the last element.
    ///
    /// # Errors
    ///
    /// Returns `PolyVecError::EmptyVector` if there is nothing to remove.
    pub fn pop(&mut self) -> Result<(), PolyVecError> {
        if self.len == 0 {
            return Err(PolyVecError::EmptyVector);
        }
        self.truncate(self.len - 1);
        Ok(())
    }

    /// Destroys the elements from `len` on, last first. Capacity is kept.
    pub fn truncate(&mut self, len: usize) {
        let base = self.block.base();
        while self.len > len {
            self.len -= 1;
            let index = self.len;
            self.free = match index {
                0 => self.region_start(),
                _ => self.slot(index - 1).end(),
            };
            // Safe: the descriptor and its object are live and no longer counted by `len`
            unsafe {
                let slot = ptr::read(Slot::<I, P>::at(base, index).as_ptr());
                ptr::drop_in_place(slot.object(base).as_ptr());
            }
        }
    }

    /// Destroys all elements. Capacity is kept.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Destroys the elements in `range` and closes the gap. Returns the index of the element
    /// that followed the range.
    ///
    /// Should an element's destructor panic, the rest of the range is still destroyed while
    /// unwinding, and the vector keeps the elements before and after the range. A second
    /// panicking destructor in the same range aborts, as with `Vec::drain`.
    ///
    /// # Errors
    ///
    /// Returns `PolyVecError::IndexOutOfBounds` for a range reaching past `len()` or
    /// starting after its end.
    pub fn erase<R: RangeBounds<usize>>(&mut self, range: R) -> Result<usize, PolyVecError> {
        let length = self.len;
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&end) => end.saturating_add(1),
            Bound::Excluded(&end) => end,
            Bound::Unbounded => length,
        };
        if end > length {
            return Err(PolyVecError::IndexOutOfBounds { index: end, length });
        }
        if start > end {
            return Err(PolyVecError::IndexOutOfBounds {
                index: start,
                length,
            });
        }
        if start == end {
            return Ok(start);
        }

        self.len = start;
        let mut guard = CloseGap {
            vec: self,
            start,
            end,
            next: start,
            old_len: length,
        };
        while guard.drop_next() {}
        drop(guard);
        Ok(start)
    }

    /// Removes the element at `index`, shifting the following ones down.
    ///
    /// # Errors
    ///
    /// Returns `PolyVecError::IndexOutOfBounds` if `index >= len()`.
    pub fn remove(&mut self, index: usize) -> Result<(), PolyVecError> {
        if index >= self.len {
            return Err(PolyVecError::IndexOutOfBounds {
                index,
                length: self.len,
            });
        }
        self.erase(index..=index).map(|_| ())
    }

    /// Moves the elements `end..old_len` down to `start`, packing them again.
    /// Expects `len == start`.
    fn close_gap(&mut self, start: usize, end: usize, old_len: usize) {
        let base = self.block.base();
        let mut cursor = match start {
            0 => self.region_start(),
            _ => self.slot(start - 1).end(),
        };
        for from in end..old_len {
            let to = start + (from - end);
            // Safe: `from` is a live descriptor; objects only move down, towards offsets
            // that are no longer in use, and descriptors are moved in increasing order
            unsafe {
                let src = Slot::<I, P>::at(base, from).as_ptr();
                let dst = Slot::<I, P>::at(base, to).as_ptr();
                let layout = (*src).layout;
                let offset = align_up_in_block(cursor, layout.align());
                ptr::copy(
                    base.add((*src).offset).as_ptr(),
                    base.add(offset).as_ptr(),
                    layout.size(),
                );
                ptr::copy(src, dst, 1);
                (*dst).offset = offset;
                cursor = offset + layout.size();
            }
        }
        self.len = start + (old_len - end);
        self.free = cursor;
    }

    /// Exchanges the contents of two vectors in O(1).
    ///
    /// # Panics
    ///
    /// If `A` does not propagate on swap and the allocators do not compare equal.
    pub fn swap(&mut self, other: &mut Self) {
        let propagate = A::PROPAGATION.on_swap;
        if !propagate {
            assert!(
                self.block.alloc == other.block.alloc,
                "swapping poly vectors whose allocators neither propagate nor compare equal"
            );
        }
        mem::swap(self, other);
        if !propagate {
            mem::swap(&mut self.block.alloc, &mut other.block.alloc);
        }
    }

    fn note_size(&mut self, size: usize) {
        let total = self.avg_size.saturating_mul(self.len).saturating_add(size);
        self.avg_size = (total / (self.len + 1)).max(1);
    }

    fn fits_at_end(&self, layout: Layout) -> bool {
        self.len < self.cap
            && layout.align() <= self.block.align()
            && align_up(self.free, layout.align())
                .and_then(|offset| offset.checked_add(layout.size()))
                .is_some_and(|end| end <= self.block.size())
    }

    /// Writes `value` and its descriptor at `index`, which must be the first unused
    /// descriptor, with the object at `offset`.
    ///
    /// # Safety
    ///
    /// `index < capacity()`, and `offset` must be aligned for `T` with `size_of::<T>()` free
    /// bytes from it inside the object region.
    unsafe fn place<T>(&mut self, index: usize, offset: usize, value: T, policy: P)
    where
        I: Coerce<T>,
    {
        let base = self.block.base();
        // Safe: forwarded from the caller
        unsafe {
            base.add(offset).cast::<T>().as_ptr().write(value);
            Slot::<I, P>::at(base, index).as_ptr().write(Slot {
                offset,
                layout: Layout::new::<T>(),
                cast: cast_fn::<T, I>(),
                policy,
            });
        }
        self.note_size(mem::size_of::<T>());
        self.len += 1;
        log::trace!(
            "poly vector: {} bytes at offset {} in slot {}",
            mem::size_of::<T>(),
            offset,
            index
        );
    }

    /// Shift applied to the elements from `index` on when a `pending` object is inserted
    /// before them: a multiple of every alignment involved, large enough that re-packing
    /// them afterwards only ever moves objects down. The layout's size is the distance.
    fn insert_shift(&self, index: usize, pending: Layout) -> Option<Layout> {
        let align = (index..self.len)
            .map(|i| self.slot(i).layout.align())
            .fold(pending.align(), usize::max);
        let distance = align_up(pending.size().checked_add(pending.align())?, align)?;
        Layout::from_size_align(distance, align).ok()
    }

    /// Opens room for an object of layout `pending` before the element at `index`: the
    /// tail moves up by `shift`, then is packed down again behind the new object. The
    /// descriptors from `index` on move up by one, leaving descriptor `index` unused.
    /// Returns the offset for the new object.
    ///
    /// # Safety
    ///
    /// `index < len() < capacity()`, and `used_bytes() + shift.size()` must fit in the block.
    unsafe fn open_gap(&mut self, index: usize, pending: Layout, shift: Layout) -> usize {
        let base = self.block.base();
        let distance = shift.size();
        let tail_start = self.slot(index).offset;
        let before = match index {
            0 => self.region_start(),
            _ => self.slot(index - 1).end(),
        };

        // Safe: the shifted tail ends inside the block, per the caller; `ptr::copy` handles
        // the overlap
        unsafe {
            ptr::copy(
                base.add(tail_start).as_ptr(),
                base.add(tail_start + distance).as_ptr(),
                self.free - tail_start,
            );
            ptr::copy(
                Slot::<I, P>::at(base, index).as_ptr(),
                Slot::<I, P>::at(base, index + 1).as_ptr(),
                self.len - index,
            );
        }

        let offset = align_up_in_block(before, pending.align());
        let mut cursor = offset + pending.size();
        for moved in index + 1..=self.len {
            // Safe: every target offset is at or below the shifted position of the object,
            // and at or above the end of the previously packed one
            unsafe {
                let slot = Slot::<I, P>::at(base, moved).as_ptr();
                let from = (*slot).offset + distance;
                let to = align_up_in_block(cursor, (*slot).layout.align());
                ptr::copy(
                    base.add(from).as_ptr(),
                    base.add(to).as_ptr(),
                    (*slot).layout.size(),
                );
                (*slot).offset = to;
                cursor = to + (*slot).layout.size();
            }
        }
        self.free = cursor;
        offset
    }
}

impl<I, P, A> PolyVec<I, P, A>
where
    I: ?Sized,
    P: CloningPolicy<I>,
    A: RawAllocator,
{
    /// Creates an empty vector from `alloc` with room for `count` elements of about
    /// `avg_size` bytes each.
    ///
    /// # Errors
    ///
    /// As for [`reserve`](Self::reserve).
    pub fn with_capacity_in(
        count: usize,
        avg_size: usize,
        alloc: A,
    ) -> Result<Self, PolyVecError> {
        let mut vec = Self::new_in(alloc);
        vec.reserve(count, avg_size)?;
        Ok(vec)
    }

    /// Appends `value`. Amortized O(1).
    ///
    /// # Errors
    ///
    /// Growth may fail with:
    /// - `PolyVecError::Mem(MemError::CloningNotSupported)` when elements would have to be
    ///   cloned to a new block under a forbidding policy;
    /// - `PolyVecError::Mem(MemError::AllocFailed { .. })` if the allocator refuses;
    /// - `PolyVecError::CapacityOverflow` if the block size is not representable.
    ///
    /// The vector is unchanged on error.
    pub fn push<T>(&mut self, value: T) -> Result<(), PolyVecError>
    where
        I: Coerce<T>,
        P: PolicyFor<T>,
    {
        let layout = Layout::new::<T>();
        if !self.fits_at_end(layout) {
            self.grow_for(self.len, layout, layout)?;
        }
        let policy = P::for_type();
        let offset = align_up_in_block(self.free, layout.align());
        // Safe: room at the end was checked or made above
        unsafe { self.place(self.len, offset, value, policy) };
        self.free = offset + layout.size();
        Ok(())
    }

    /// Inserts `value` before the element at `index` and returns `index`.
    ///
    /// # Errors
    ///
    /// `PolyVecError::IndexOutOfBounds` if `index > len()`, otherwise as for
    /// [`push`](Self::push). The vector is unchanged on error.
    pub fn insert<T>(&mut self, index: usize, value: T) -> Result<usize, PolyVecError>
    where
        I: Coerce<T>,
        P: PolicyFor<T>,
    {
        if index > self.len {
            return Err(PolyVecError::IndexOutOfBounds {
                index,
                length: self.len,
            });
        }
        if index == self.len {
            self.push(value)?;
            return Ok(index);
        }

        let pending = Layout::new::<T>();
        let shift = self
            .insert_shift(index, pending)
            .ok_or(PolyVecError::CapacityOverflow {
                requested: usize::MAX,
                max: self.block.alloc.max_size(),
            })?;
        let fits = self.len < self.cap
            && pending.align() <= self.block.align()
            && self
                .free
                .checked_add(shift.size())
                .is_some_and(|end| end <= self.block.size());
        if !fits {
            self.grow_for(index, pending, shift)?;
        }

        let policy = P::for_type();
        // Safe: room for the shifted tail was checked or made above
        unsafe {
            let offset = self.open_gap(index, pending, shift);
            self.place(index, offset, value, policy);
        }
        Ok(index)
    }

    /// Makes room for `count` elements in total, the missing ones assumed to be `avg_size`
    /// bytes with the alignment of `usize`.
    ///
    /// # Errors
    ///
    /// As for [`push`](Self::push).
    pub fn reserve(&mut self, count: usize, avg_size: usize) -> Result<(), PolyVecError> {
        self.reserve_aligned(count, avg_size, mem::align_of::<usize>())
    }

    /// Makes room for `count` elements in total, the missing ones assumed to be `avg_size`
    /// bytes aligned to `align`. Does nothing if they already fit.
    ///
    /// # Errors
    ///
    /// `PolyVecError::Mem(MemError::InvalidLayout { .. })` if `align` is not a power of two,
    /// otherwise as for [`push`](Self::push).
    pub fn reserve_aligned(
        &mut self,
        count: usize,
        avg_size: usize,
        align: usize,
    ) -> Result<(), PolyVecError> {
        let element = Layout::from_size_align(avg_size, align).map_err(|_| {
            MemError::InvalidLayout {
                size: avg_size,
                align,
            }
        })?;
        if count <= self.len {
            return Ok(());
        }

        let tail = Uniform {
            count: count - self.len,
            layout: element,
        };
        let fits = count <= self.cap
            && align <= self.block.align()
            && layout::simulate(self.cap, Self::slot_layout(), self.layouts(), Some(tail))
                .is_some_and(|end| end <= self.block.size());
        if fits {
            return Ok(());
        }

        let plan = layout::plan(
            Request {
                layouts: self.layouts(),
                tail: Some(tail),
                count,
                start_capacity: self.cap,
                avg_size: self.avg_size.max(avg_size),
                pending: None,
                min_align: self.block.align(),
            },
            Self::slot_layout(),
            self.block.alloc.max_size(),
        )?;
        self.relocate(&plan)
    }

    /// Grows so that an element of layout `pending` can go in at `index`. `extra` is the
    /// room the placement needs after the current objects: `pending` itself when appending,
    /// the tail shift when inserting.
    fn grow_for(
        &mut self,
        index: usize,
        pending: Layout,
        extra: Layout,
    ) -> Result<(), PolyVecError> {
        debug_assert!(index <= self.len);
        let start_capacity = match self.cap {
            0 => 1,
            cap => cap.saturating_mul(2),
        };
        let plan = layout::plan(
            Request {
                layouts: self.layouts().chain(iter::once(extra)),
                tail: None,
                count: self.len + 1,
                start_capacity,
                avg_size: self.avg_size,
                pending: Some(pending),
                min_align: self.block.align(),
            },
            Self::slot_layout(),
            self.block.alloc.max_size(),
        )?;
        self.relocate(&plan)
    }

    /// Re-lays out every element into a new block per `plan`. On error the vector is
    /// unchanged.
    fn relocate(&mut self, plan: &Plan) -> Result<(), PolyVecError> {
        let mut fresh = Self::from_plan(plan, self.block.alloc.clone(), self.avg_size)?;
        let moved = if P::NOEXCEPT_MOVABLE {
            self.move_into(&mut fresh)
        } else {
            self.clone_into(&mut fresh)
        };
        if let Err(err) = moved {
            log::warn!(
                "poly vector: growth to {} slots rolled back: {}",
                plan.capacity,
                err
            );
            return Err(err);
        }

        log::debug!(
            "poly vector: grew from {} to {} slots, {} to {} bytes, {} retries, {}",
            self.cap,
            plan.capacity,
            self.block.size(),
            plan.bytes,
            plan.retries,
            if P::NOEXCEPT_MOVABLE { "moved" } else { "copied" }
        );
        drop(mem::replace(self, fresh));
        Ok(())
    }

    /// Moves every element into the empty vector `dst` through the cloning policy. On
    /// success `self` is left empty. On failure the moved elements are moved back.
    fn move_into(&mut self, dst: &mut Self) -> Result<(), PolyVecError> {
        let src_base = self.block.base();
        let dst_base = dst.block.base();
        let guard = MoveBack { src: self, dst };

        for index in 0..guard.src.len {
            // Safe: `index` is a live descriptor of the source
            let slot = unsafe { Slot::<I, P>::at(src_base, index).as_ref() };
            let offset = align_up_in_block(guard.dst.free, slot.layout.align());
            // Safe: the destination block was planned for this exact arrangement; the
            // descriptor is duplicated bitwise, and only one of the copies is ever counted
            unsafe {
                slot.policy
                    .move_to(slot.object(src_base), dst_base.add(offset))?;
                Slot::<I, P>::at(dst_base, index).as_ptr().write(Slot {
                    offset,
                    layout: slot.layout,
                    cast: slot.cast,
                    policy: ptr::read(&slot.policy),
                });
            }
            guard.dst.len += 1;
            guard.dst.free = offset + slot.layout.size();
        }

        guard.src.len = 0;
        mem::forget(guard);
        Ok(())
    }

    /// Clones every element into the empty vector `dst`, in order. On failure `dst` holds
    /// the clones made so far, which it destroys when dropped.
    fn clone_into(&self, dst: &mut Self) -> Result<(), PolyVecError> {
        let src_base = self.block.base();
        let dst_base = dst.block.base();

        for index in 0..self.len {
            let slot = self.slot(index);
            let policy = slot.policy.clone();
            let offset = align_up_in_block(dst.free, slot.layout.align());
            // Safe: the destination block was planned for this exact arrangement
            unsafe {
                slot.policy
                    .clone_to(slot.object(src_base).as_ref(), dst_base.add(offset))?;
                Slot::<I, P>::at(dst_base, index).as_ptr().write(Slot {
                    offset,
                    layout: slot.layout,
                    cast: slot.cast,
                    policy,
                });
            }
            dst.len += 1;
            dst.free = offset + slot.layout.size();
        }
        Ok(())
    }

    fn plan_copy(&self) -> Result<Plan, PolyVecError> {
        layout::plan(
            Request {
                layouts: self.layouts(),
                tail: None,
                count: self.len,
                start_capacity: self.len,
                avg_size: self.avg_size,
                pending: None,
                min_align: 1,
            },
            Self::slot_layout(),
            self.block.alloc.max_size(),
        )
    }

    fn clone_with(&self, alloc: A) -> Result<Self, PolyVecError> {
        if self.is_empty() {
            return Ok(Self::new_in(alloc));
        }
        let plan = self.plan_copy()?;
        let mut copy = Self::from_plan(&plan, alloc, self.avg_size)?;
        self.clone_into(&mut copy)?;
        Ok(copy)
    }

    /// Copy construction: a new vector, sized for the elements, holding clones of them.
    /// The allocator comes from `RawAllocator::select_on_copy`.
    ///
    /// # Errors
    ///
    /// `PolyVecError::Mem(MemError::CloningNotSupported)` under a forbidding policy (unless
    /// the vector is empty), or an allocation failure.
    pub fn try_clone(&self) -> Result<Self, PolyVecError> {
        self.clone_with(self.block.alloc.select_on_copy())
    }

    /// Copy assignment. The allocator follows `source` only if it propagates on copy.
    ///
    /// # Errors
    ///
    /// As for [`try_clone`](Self::try_clone). On error `self` is unchanged.
    pub fn try_clone_from(&mut self, source: &Self) -> Result<(), PolyVecError> {
        let alloc = if A::PROPAGATION.on_copy_assign {
            source.block.alloc.clone()
        } else {
            self.block.alloc.clone()
        };
        let copy = source.clone_with(alloc)?;
        drop(mem::replace(self, copy));
        Ok(())
    }

    /// Move assignment honouring the allocator's propagation rules.
    ///
    /// The block changes hands in O(1) when `A` propagates on move or both allocators
    /// compare equal. Otherwise the elements are relocated one by one into a block from
    /// `self`'s allocator, moved when the policy allows it and cloned otherwise.
    ///
    /// # Errors
    ///
    /// Only on the element-by-element path, as for [`push`](Self::push). On error `self` is
    /// unchanged and `source` is dropped with its elements.
    pub fn assign_from(&mut self, mut source: Self) -> Result<(), PolyVecError> {
        let propagate = A::PROPAGATION.on_move_assign;
        if propagate || self.block.alloc == source.block.alloc {
            if !propagate {
                mem::swap(&mut self.block.alloc, &mut source.block.alloc);
            }
            drop(mem::replace(self, source));
            return Ok(());
        }

        if source.is_empty() {
            self.clear();
            return Ok(());
        }

        let plan = source.plan_copy()?;
        let mut fresh = Self::from_plan(&plan, self.block.alloc.clone(), source.avg_size)?;
        if P::NOEXCEPT_MOVABLE {
            source.move_into(&mut fresh)?;
        } else {
            source.clone_into(&mut fresh)?;
        }
        drop(mem::replace(self, fresh));
        Ok(())
    }
}

impl<I, P> PolyVec<I, P, Global>
where
    I: ?Sized,
    P: CloningPolicy<I>,
{
    /// Creates an empty vector with room for `count` elements of about `avg_size` bytes
    /// each.
    ///
    /// # Errors
    ///
    /// As for [`reserve`](Self::reserve).
    pub fn with_capacity(count: usize, avg_size: usize) -> Result<Self, PolyVecError> {
        Self::with_capacity_in(count, avg_size, Global)
    }
}

/// Moves elements back to the source vector if a relocation pass stops early.
struct MoveBack<'a, I: ?Sized, P, A: RawAllocator> {
    src: &'a mut PolyVec<I, P, A>,
    dst: &'a mut PolyVec<I, P, A>,
}

impl<I: ?Sized, P, A: RawAllocator> Drop for MoveBack<'_, I, P, A> {
    fn drop(&mut self) {
        let src_base = self.src.block.base();
        let dst_base = self.dst.block.base();
        for index in 0..self.dst.len {
            // Safe: descriptors below `dst.len` were duplicated from the source, which still
            // has its own copies with the original offsets
            unsafe {
                let moved = Slot::<I, P>::at(dst_base, index).as_ref();
                let original = Slot::<I, P>::at(src_base, index).as_ref();
                ptr::copy_nonoverlapping(
                    dst_base.add(moved.offset).as_ptr(),
                    src_base.add(original.offset).as_ptr(),
                    moved.layout.size(),
                );
            }
        }
        log::warn!(
            "poly vector: relocation stopped, {} elements moved back",
            self.dst.len
        );
        self.dst.len = 0;
    }
}

/// Packs the tail of the vector down over an erased range, even if dropping an erased
/// element panics.
struct CloseGap<'a, I: ?Sized, P, A: RawAllocator> {
    vec: &'a mut PolyVec<I, P, A>,
    start: usize,
    end: usize,
    next: usize,
    old_len: usize,
}

impl<I: ?Sized, P, A: RawAllocator> CloseGap<'_, I, P, A> {
    /// Destroys the next element of the range. Returns `false` once the range is done.
    fn drop_next(&mut self) -> bool {
        if self.next == self.end {
            return false;
        }
        let index = self.next;
        self.next += 1;
        let base = self.vec.block.base();
        // Safe: elements in the range are live, no longer counted by `len`, and each one is
        // visited once since `next` moves past it first
        unsafe {
            let slot = ptr::read(Slot::<I, P>::at(base, index).as_ptr());
            ptr::drop_in_place(slot.object(base).as_ptr());
        }
        true
    }
}

impl<I: ?Sized, P, A: RawAllocator> Drop for CloseGap<'_, I, P, A> {
    fn drop(&mut self) {
        // a destructor unwound out of `erase`: finish the range before packing the tail
        while self.drop_next() {}
        self.vec.close_gap(self.start, self.end, self.old_len);
    }
}

impl<I: ?Sized, P> Default for PolyVec<I, P, Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ?Sized, P, A: RawAllocator> Drop for PolyVec<I, P, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<I, P, A> Clone for PolyVec<I, P, A>
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
            .unwrap_or_else(|err| panic!("cloning poly vector: {err}"))
    }
}

impl<I: ?Sized, P, A: RawAllocator> Index<usize> for PolyVec<I, P, A> {
    type Output = I;

    fn index(&self, index: usize) -> &I {
        let length = self.len;
        match self.get(index) {
            Some(value) => value,
            None => panic!("Index {index} out of bounds for vector of length {length}"),
        }
    }
}

impl<I: ?Sized, P, A: RawAllocator> IndexMut<usize> for PolyVec<I, P, A> {
    fn index_mut(&mut self, index: usize) -> &mut I {
        let length = self.len;
        match self.get_mut(index) {
            Some(value) => value,
            None => panic!("Index {index} out of bounds for vector of length {length}"),
        }
    }
}

impl<'a, I: ?Sized, P, A: RawAllocator> IntoIterator for &'a PolyVec<I, P, A> {
    type Item = &'a I;
    type IntoIter = Iter<'a, I, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, I: ?Sized, P, A: RawAllocator> IntoIterator for &'a mut PolyVec<I, P, A> {
    type Item = &'a mut I;
    type IntoIter = IterMut<'a, I, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<I: ?Sized, P, A: RawAllocator> fmt::Debug for PolyVec<I, P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolyVec")
            .field("len", &self.len)
            .field("capacity", &self.cap)
            .field("bytes", &self.block.size())
            .field("used", &self.free)
            .finish()
    }
}
