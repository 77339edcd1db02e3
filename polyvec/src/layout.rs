//! Growth planning for the dual-region block.
//!
//! A block holds `capacity` descriptors followed by the objects, each placed at the next
//! offset aligned for its type. Because alignment padding depends on where each object lands,
//! whether a candidate block fits is decided by simulating the placement rather than by a
//! closed formula.

use core::alloc::Layout;

use crate::error::PolyVecError;

/// Rounds `offset` up to a multiple of `align` (a power of two).
pub(crate) fn align_up(offset: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    offset.checked_add(align - 1).map(|v| v & !(align - 1))
}

/// [`align_up`] for offsets already known to lie inside an allocated block, where rounding
/// up cannot overflow.
pub(crate) fn align_up_in_block(offset: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// `count` elements of the same layout, e.g. those announced by `reserve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Uniform {
    pub(crate) count: usize,
    pub(crate) layout: Layout,
}

/// Places `layouts`, then `tail`, after a descriptor region of `capacity` slots of `slot`.
/// Returns the end of the object region, or `None` on arithmetic overflow.
pub(crate) fn simulate<L>(
    capacity: usize,
    slot: Layout,
    layouts: L,
    tail: Option<Uniform>,
) -> Option<usize>
where
    L: Iterator<Item = Layout>,
{
    let mut cursor = capacity.checked_mul(slot.size())?;
    for layout in layouts {
        cursor = align_up(cursor, layout.align())?.checked_add(layout.size())?;
    }
    if let Some(tail) = tail.filter(|t| t.count > 0) {
        let first = align_up(cursor, tail.layout.align())?;
        let stride = align_up(tail.layout.size(), tail.layout.align())?;
        cursor = stride
            .checked_mul(tail.count - 1)?
            .checked_add(first)?
            .checked_add(tail.layout.size())?;
    }
    Some(cursor)
}

/// What a growth pass must make room for.
pub(crate) struct Request<L> {
    /// The full arrangement to validate, in order.
    pub(crate) layouts: L,
    /// Hypothetical elements appended after `layouts`.
    pub(crate) tail: Option<Uniform>,
    /// Number of descriptors the arrangement needs.
    pub(crate) count: usize,
    /// First capacity to try.
    pub(crate) start_capacity: usize,
    /// Running estimate of the object size.
    pub(crate) avg_size: usize,
    /// The element whose insertion triggered the growth, if any.
    pub(crate) pending: Option<Layout>,
    /// Alignment the new block must keep at least.
    pub(crate) min_align: usize,
}

/// An accepted candidate block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Plan {
    pub(crate) capacity: usize,
    pub(crate) bytes: usize,
    pub(crate) align: usize,
    /// Number of rejected candidates before this one.
    pub(crate) retries: u32,
}

impl Plan {
    pub(crate) fn layout(&self) -> Result<Layout, PolyVecError> {
        Layout::from_size_align(self.bytes, self.align).map_err(|_| {
            PolyVecError::CapacityOverflow {
                requested: self.bytes,
                max: isize::MAX as usize,
            }
        })
    }
}

fn candidate_bytes(
    capacity: usize,
    slot: Layout,
    avg_size: usize,
    pending: Option<Layout>,
    align: usize,
) -> Option<usize> {
    let slack = pending.map_or(0, |p| p.size() + p.align());
    capacity
        .checked_mul(slot.size())?
        .checked_add(capacity.checked_mul(avg_size)?)?
        .checked_add(slack)?
        .checked_add(align)
}

/// Chooses the capacity and byte size of a new block for `request`.
///
/// Starting from `request.start_capacity`, a candidate size is derived from the average
/// object size and checked by simulating the real placement. A rejected candidate doubles
/// the capacity and tries again. An accepted one whose headroom exceeds twice what the spare
/// slots are expected to need is trimmed once.
pub(crate) fn plan<L>(
    request: Request<L>,
    slot: Layout,
    max_size: usize,
) -> Result<Plan, PolyVecError>
where
    L: Iterator<Item = Layout> + Clone,
{
    let overflow = |requested: usize| PolyVecError::CapacityOverflow {
        requested,
        max: max_size,
    };

    let align = request
        .layouts
        .clone()
        .map(|l| l.align())
        .chain(request.tail.map(|t| t.layout.align()))
        .chain(request.pending.map(|p| p.align()))
        .fold(request.min_align.max(slot.align()), usize::max);
    let avg_size = request.avg_size.max(1);

    let mut capacity = request.start_capacity.max(request.count).max(1);
    let mut retries = 0;
    loop {
        if capacity.saturating_mul(slot.size()) > max_size {
            return Err(overflow(capacity.saturating_mul(slot.size())));
        }
        let candidate = candidate_bytes(capacity, slot, avg_size, request.pending, align)
            .ok_or_else(|| overflow(usize::MAX))?;
        let needed = simulate(capacity, slot, request.layouts.clone(), request.tail)
            .ok_or_else(|| overflow(usize::MAX))?;
        if needed > max_size {
            return Err(overflow(needed));
        }

        if needed <= candidate {
            let spare = (capacity - request.count).saturating_mul(avg_size);
            let expected = spare.saturating_add(align);
            let mut bytes = candidate;
            if candidate - needed > expected.saturating_mul(2) {
                bytes = needed.saturating_add(expected);
                log::debug!(
                    "poly vector: trimming candidate from {} to {} bytes",
                    candidate,
                    bytes
                );
            }
            return Ok(Plan {
                capacity,
                bytes: bytes.min(max_size),
                align,
                retries,
            });
        }

        log::debug!(
            "poly vector: candidate of {} slots / {} bytes too small ({} needed), doubling",
            capacity,
            candidate,
            needed
        );
        retries += 1;
        capacity = capacity.checked_mul(2).ok_or_else(|| overflow(usize::MAX))?;
    }
}
