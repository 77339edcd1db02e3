use core::any::Any;
use core::fmt::Debug;
use core::ptr::NonNull;

/// Views a concrete `T` as the capability set `Self`, typically `dyn Trait`.
///
/// This is what lets a container hold a `T` and hand out `&dyn Trait`: the container captures
/// `cast_fn::<T, Self>()` when the value is inserted and re-derives the typed pointer from the
/// value's current address on every access.
///
/// Use [`impl_coerce!`](crate::impl_coerce) to implement it for a trait object type.
///
/// # Safety
///
/// `coerce` must return a pointer to the same address it was given, only adding metadata.
/// The unsizing coercion `ptr as *mut dyn Trait` always satisfies this.
pub unsafe trait Coerce<T> {
    /// Attaches the metadata of `Self` to a pointer to a `T`.
    fn coerce(ptr: *mut T) -> *mut Self;
}

/// Implements [`Coerce`] for `dyn Trait` and every `T: Trait + 'static`.
///
/// ```
/// trait Shape {
///     fn area(&self) -> f64;
/// }
/// polymem::impl_coerce!(Shape);
/// ```
#[macro_export]
macro_rules! impl_coerce {
    ($($tr:path),+ $(,)?) => {
        $(
            unsafe impl<T: $tr + 'static> $crate::Coerce<T> for dyn $tr {
                fn coerce(ptr: *mut T) -> *mut Self {
                    ptr
                }
            }
        )+
    };
}

unsafe impl<T: Any> Coerce<T> for dyn Any {
    fn coerce(ptr: *mut T) -> *mut Self {
        ptr
    }
}

unsafe impl<T: Debug + 'static> Coerce<T> for dyn Debug {
    fn coerce(ptr: *mut T) -> *mut Self {
        ptr
    }
}

/// Type-erased cast from a value address to a typed capability-set pointer.
pub type CastFn<I> = fn(NonNull<u8>) -> NonNull<I>;

fn cast<T, I>(ptr: NonNull<u8>) -> NonNull<I>
where
    I: ?Sized + Coerce<T>,
{
    let typed = I::coerce(ptr.as_ptr().cast::<T>());
    // Safe: `Coerce` keeps the address, which came from a `NonNull`
    unsafe {
        NonNull::new_unchecked(typed)
    }
}

/// Returns the cast function for the concrete type `T` viewed as `I`.
#[must_use]
pub fn cast_fn<T, I>() -> CastFn<I>
where
    I: ?Sized + Coerce<T>,
{
    cast::<T, I>
}
