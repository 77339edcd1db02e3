mod common;

use std::rc::Rc;

use common::{ids, Large, Pinned, Propagating, Shape, Small, Standard, Tracking};
use polyvec::{DelegateCloning, MemError, NoCloning, PolyVec, PolyVecError, VirtualCloning};

type Tracked<M, P = VirtualCloning> = PolyVec<dyn Shape, P, Tracking<M>>;

fn filled<M: common::Mode, P>(alloc: &Tracking<M>, first: u32, count: u32) -> Tracked<M, P>
where
    P: polyvec::CloningPolicy<dyn Shape> + polyvec::PolicyFor<Small> + polyvec::PolicyFor<Large>,
{
    let mut vec = PolyVec::new_in(alloc.clone());
    for id in first..first + count {
        if id % 2 == 0 {
            vec.push(Small::new(id)).unwrap();
        } else {
            vec.push(Large::new(id)).unwrap();
        }
    }
    vec
}

fn addrs<P, A: polyvec::RawAllocator>(vec: &PolyVec<dyn Shape, P, A>) -> Vec<usize> {
    vec.iter().map(|s| s.addr()).collect()
}

#[test]
fn test_blocks_are_released() {
    let alloc = Tracking::<Standard>::new(1);
    let vec: Tracked<Standard> = filled(&alloc, 0, 20);
    assert!(alloc.total() > 1);
    assert_eq!(alloc.live(), 1);
    drop(vec);
    assert_eq!(alloc.live(), 0);
}

#[test]
fn test_empty_vector_allocates_nothing() {
    let alloc = Tracking::<Standard>::new(1);
    let vec: Tracked<Standard> = PolyVec::new_in(alloc.clone());
    let copy = vec.try_clone().unwrap();
    assert!(copy.is_empty());
    assert_eq!(alloc.total(), 0);
}

#[test]
fn test_swap_takes_the_allocators_along() {
    let first = Tracking::<Standard>::new(1);
    let second = Tracking::<Standard>::new(2);
    let mut a: Tracked<Standard> = filled(&first, 0, 3);
    let mut b: Tracked<Standard> = filled(&second, 10, 5);
    let allocations = first.total() + second.total();

    a.swap(&mut b);

    assert_eq!(ids(&a), vec![10, 11, 12, 13, 14]);
    assert_eq!(ids(&b), vec![0, 1, 2]);
    assert_eq!(a.allocator().id, 2);
    assert_eq!(b.allocator().id, 1);
    assert_eq!(first.total() + second.total(), allocations);

    drop(a);
    assert_eq!(second.live(), 0);
    drop(b);
    assert_eq!(first.live(), 0);
}

#[test]
fn test_swap_keeps_equal_pinned_allocators() {
    let first = Tracking::<Pinned>::new(1);
    let second = Tracking::<Pinned>::new(1);
    let mut a: Tracked<Pinned> = filled(&first, 0, 3);
    let mut b: Tracked<Pinned> = filled(&second, 10, 2);
    let b_addrs = addrs(&b);

    a.swap(&mut b);

    assert_eq!(ids(&a), vec![10, 11]);
    assert_eq!(addrs(&a), b_addrs);
    assert!(Rc::ptr_eq(&a.allocator().stats, &first.stats));
    assert!(Rc::ptr_eq(&b.allocator().stats, &second.stats));
}

#[test]
#[should_panic(expected = "neither propagate nor compare equal")]
fn test_swap_rejects_unequal_pinned_allocators() {
    let mut a: Tracked<Pinned> = filled(&Tracking::new(1), 0, 1);
    let mut b: Tracked<Pinned> = filled(&Tracking::new(2), 0, 1);
    a.swap(&mut b);
}

#[test]
fn test_move_assignment_hands_the_block_over() {
    let first = Tracking::<Standard>::new(1);
    let second = Tracking::<Standard>::new(2);
    let mut a: Tracked<Standard> = filled(&first, 0, 3);
    let b: Tracked<Standard> = filled(&second, 10, 4);
    let b_addrs = addrs(&b);
    let allocations = second.total();

    a.assign_from(b).unwrap();

    assert_eq!(ids(&a), vec![10, 11, 12, 13]);
    assert_eq!(addrs(&a), b_addrs);
    assert_eq!(a.allocator().id, 2);
    assert_eq!(second.total(), allocations);
    assert_eq!(first.live(), 0);
}

#[test]
fn test_move_assignment_between_equal_pinned_allocators() {
    let first = Tracking::<Pinned>::new(7);
    let second = Tracking::<Pinned>::new(7);
    let mut a: Tracked<Pinned> = filled(&first, 0, 3);
    let b: Tracked<Pinned> = filled(&second, 10, 4);
    let b_addrs = addrs(&b);

    a.assign_from(b).unwrap();

    assert_eq!(addrs(&a), b_addrs);
    assert!(Rc::ptr_eq(&a.allocator().stats, &first.stats));
}

#[test]
fn test_move_assignment_relocates_between_unequal_allocators() {
    let first = Tracking::<Pinned>::new(1);
    let second = Tracking::<Pinned>::new(2);
    let mut a: Tracked<Pinned> = filled(&first, 0, 3);
    let b: Tracked<Pinned> = filled(&second, 10, 5);
    let allocations = first.total();

    a.assign_from(b).unwrap();

    assert_eq!(ids(&a), vec![10, 11, 12, 13, 14]);
    assert_eq!(a.allocator().id, 1);
    assert_eq!(first.total(), allocations + 1);
    assert_eq!(first.live(), 1);
    assert_eq!(second.live(), 0);
    assert!(a.iter().all(|s| s.addr() % s.align() == 0));
}

#[test]
fn test_move_assignment_relocates_by_cloning() {
    let first = Tracking::<Pinned>::new(1);
    let second = Tracking::<Pinned>::new(2);
    let mut a: Tracked<Pinned, DelegateCloning<false>> = filled(&first, 0, 2);
    let b: Tracked<Pinned, DelegateCloning<false>> = filled(&second, 10, 3);

    a.assign_from(b).unwrap();

    assert_eq!(ids(&a), vec![10, 11, 12]);
    assert_eq!(first.live(), 1);
    assert_eq!(second.live(), 0);
}

#[test]
fn test_move_assignment_refused_by_forbidding_policy() {
    let first = Tracking::<Pinned>::new(1);
    let second = Tracking::<Pinned>::new(2);
    let mut a: Tracked<Pinned, NoCloning> = filled(&first, 0, 1);
    let b: Tracked<Pinned, NoCloning> = filled(&second, 10, 1);

    assert_eq!(
        a.assign_from(b),
        Err(PolyVecError::Mem(MemError::CloningNotSupported))
    );
    assert_eq!(ids(&a), vec![0]);
    assert_eq!(first.live(), 1);
    assert_eq!(second.live(), 0);
}

#[test]
fn test_move_assignment_from_empty_vector_keeps_capacity() {
    let first = Tracking::<Pinned>::new(1);
    let second = Tracking::<Pinned>::new(2);
    let mut a: Tracked<Pinned> = filled(&first, 0, 4);
    let capacity = a.capacity();

    a.assign_from(PolyVec::new_in(second.clone())).unwrap();

    assert!(a.is_empty());
    assert_eq!(a.capacity(), capacity);
    assert_eq!(a.allocator().id, 1);
}

#[test]
fn test_copy_assignment_keeps_own_allocator() {
    let first = Tracking::<Standard>::new(1);
    let second = Tracking::<Standard>::new(2);
    let mut a: Tracked<Standard> = filled(&first, 0, 3);
    let b: Tracked<Standard> = filled(&second, 10, 2);

    a.try_clone_from(&b).unwrap();

    assert_eq!(ids(&a), vec![10, 11]);
    assert_eq!(ids(&b), vec![10, 11]);
    assert_eq!(a.allocator().id, 1);
    assert_eq!(first.live(), 1);
}

#[test]
fn test_copy_assignment_propagates_allocator() {
    let first = Tracking::<Propagating>::new(1);
    let second = Tracking::<Propagating>::new(2);
    let mut a: Tracked<Propagating> = filled(&first, 0, 3);
    let b: Tracked<Propagating> = filled(&second, 10, 2);

    a.try_clone_from(&b).unwrap();

    assert_eq!(ids(&a), vec![10, 11]);
    assert_eq!(a.allocator().id, 2);
    assert_eq!(first.live(), 0);
    assert_eq!(second.live(), 2);
}

#[test]
fn test_failed_copy_assignment_leaves_target_untouched() {
    let first = Tracking::<Standard>::new(1);
    let second = Tracking::<Standard>::new(2);
    let mut a: Tracked<Standard, NoCloning> = filled(&first, 0, 1);
    let b: Tracked<Standard, NoCloning> = filled(&second, 10, 1);

    assert!(a.try_clone_from(&b).unwrap_err().is_cloning_not_supported());
    assert_eq!(ids(&a), vec![0]);
    assert_eq!(first.live(), 1);
}

#[test]
fn test_copy_uses_the_selected_allocator() {
    let alloc = Tracking::<Standard>::new(3);
    let vec: Tracked<Standard> = filled(&alloc, 0, 6);
    let allocations = alloc.total();

    let copy = vec.try_clone().unwrap();

    assert_eq!(copy.allocator().id, 3);
    assert_eq!(alloc.total(), allocations + 1);
    assert_eq!(alloc.live(), 2);
    assert_eq!(ids(&copy), ids(&vec));
    assert!(copy.capacity() >= copy.len());
}

#[test]
fn test_failed_copy_allocation() {
    let alloc = Tracking::<Standard>::new(1);
    let vec: Tracked<Standard> = filled(&alloc, 0, 2);

    alloc.fail_next(true);
    let err = vec.try_clone().unwrap_err();
    alloc.fail_next(false);

    assert!(matches!(err, PolyVecError::Mem(MemError::AllocFailed { .. })));
    assert_eq!(alloc.live(), 1);
}
