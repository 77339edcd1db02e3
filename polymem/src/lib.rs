#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

//! `polymem`: building blocks for storing polymorphic values by value.
//!
//! The crate provides:
//!
//! - [`ByteBuffer`]: raw storage with an inline threshold. Small requests live inside the
//!   buffer object, larger ones come from a [`RawAllocator`].
//! - Cloning policies ([`VirtualCloning`], [`DelegateCloning`], [`NoCloning`]): how a value
//!   known only through its capability set is duplicated or relocated.
//! - [`PolyStorage`]: one value of any concrete type, seen as `dyn Trait`, stored in a
//!   `ByteBuffer` without a dedicated heap allocation when it is small.
//!
//! A capability set is a trait object type. It becomes usable once [`impl_coerce!`] has been
//! invoked for it:
//!
//! ```
//! use polymem::{impl_coerce, PolyClone, PolyStorage};
//!
//! trait Animal: PolyClone {
//!     fn speak(&self) -> &'static str;
//! }
//! impl_coerce!(Animal);
//!
//! #[derive(Clone)]
//! struct Cat;
//!
//! impl Animal for Cat {
//!     fn speak(&self) -> &'static str {
//!         "meow"
//!     }
//! }
//!
//! let mut pet = PolyStorage::<dyn Animal>::new(Cat).unwrap();
//! assert!(pet.is_inline());
//! assert_eq!(pet.get().unwrap().speak(), "meow");
//!
//! pet.reset();
//! assert!(pet.is_empty());
//! ```
//!
//! # Memory model
//!
//! Values are addressed through a cast function captured when they are stored, never through
//! a stored fat pointer. A container holding inline values may therefore be moved like any
//! other Rust value.
//!
//! ## `no_std` Compatibility
//!
//! The crate only needs `core` and `alloc`. Enable the `std` feature to get
//! `std::error::Error` on the error type:
//! ```toml
//! [dependencies]
//! polymem = { version = "0.1", features = ["std"] }
//! ```

extern crate alloc;

mod allocator;
mod buffer;
mod cloning;
mod coerce;
mod error;
mod storage;

pub use allocator::{AllocError, Global, Propagation, RawAllocator};
pub use buffer::{ByteBuffer, DEFAULT_INLINE_SIZE, INLINE_ALIGN};
pub use cloning::{CloningPolicy, DelegateCloning, NoCloning, PolicyFor, PolyClone, VirtualCloning};
pub use coerce::{cast_fn, CastFn, Coerce};
pub use error::MemError;
pub use storage::PolyStorage;
