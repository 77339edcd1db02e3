mod common;

use std::cell::Cell;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::rc::Rc;

use common::{Circle, Counted, Label, Shape, Tag};
use polymem::{
    cast_fn, CloningPolicy, DelegateCloning, MemError, NoCloning, PolicyFor, VirtualCloning,
};

fn slot<T>() -> MaybeUninit<T> {
    MaybeUninit::uninit()
}

#[test]
fn test_infallible_move_flags() {
    assert!(<VirtualCloning as CloningPolicy<dyn Shape>>::NOEXCEPT_MOVABLE);
    assert!(<DelegateCloning as CloningPolicy<dyn Label>>::NOEXCEPT_MOVABLE);
    assert!(!<DelegateCloning<false> as CloningPolicy<dyn Label>>::NOEXCEPT_MOVABLE);
    assert!(!<NoCloning as CloningPolicy<dyn Label>>::NOEXCEPT_MOVABLE);
}

#[test]
fn test_virtual_clone_through_capability_set() {
    let source = Circle { radius: 2.0 };
    let mut dst = slot::<Circle>();
    let policy = <VirtualCloning as PolicyFor<Circle>>::for_type();

    unsafe {
        policy
            .clone_to(&source as &dyn Shape, NonNull::from(&mut dst).cast())
            .unwrap();
        assert_eq!(dst.assume_init(), source);
    }
}

#[test]
fn test_delegate_clone_and_relocate() {
    let source = Tag("label");
    let policy = <DelegateCloning as PolicyFor<Tag>>::for_type();
    let cast = cast_fn::<Tag, dyn Label>();

    let mut cloned = slot::<Tag>();
    let mut relocated = slot::<Tag>();
    unsafe {
        policy
            .clone_to(&source as &dyn Label, NonNull::from(&mut cloned).cast())
            .unwrap();
        let src = cast(NonNull::from(&mut cloned).cast());
        policy
            .move_to(src, NonNull::from(&mut relocated).cast())
            .unwrap();
        assert_eq!(relocated.assume_init().text(), "label");
    }
}

#[test]
fn test_virtual_move_does_not_drop_source() {
    let drops = Rc::new(Cell::new(0));
    let mut source = std::mem::ManuallyDrop::new(Counted::new(1.5, &drops));
    let mut dst = slot::<Counted>();
    let policy = <VirtualCloning as PolicyFor<Counted>>::for_type();

    unsafe {
        let src = cast_fn::<Counted, dyn Shape>()(NonNull::from(&mut *source).cast());
        policy.move_to(src, NonNull::from(&mut dst).cast()).unwrap();
        assert_eq!(drops.get(), 0);
        let moved = dst.assume_init();
        assert_eq!(moved.area(), 1.5);
    }
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_forbidding_policy_errors() {
    let source = Circle { radius: 1.0 };
    let mut dst = slot::<Circle>();
    let policy = <NoCloning as PolicyFor<Circle>>::for_type();

    let result =
        unsafe { policy.clone_to(&source as &dyn Shape, NonNull::from(&mut dst).cast()) };
    assert_eq!(result, Err(MemError::CloningNotSupported));

    let src = NonNull::from(&source as &dyn Shape);
    let result = unsafe { policy.move_to(src, NonNull::from(&mut dst).cast()) };
    assert_eq!(result, Err(MemError::CloningNotSupported));
}
