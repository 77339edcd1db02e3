#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

//! `PolyVec`: a growable vector of heterogeneous trait objects stored by value.
//!
//! Instead of `Vec<Box<dyn Trait>>`, which allocates once per element and scatters the
//! objects over the heap, `PolyVec<dyn Trait>` keeps every element in one block:
//!
//! Block layout: [descriptor region][object region]
//! The descriptor region stores one descriptor per slot (object offset, layout, cast
//! function, cloning policy). Objects follow it in insertion order, each at the next offset
//! aligned for its type.
//!
//! ```
//! use polyvec::{impl_coerce, PolyClone, PolyVec};
//!
//! trait Shape: PolyClone {
//!     fn area(&self) -> f64;
//! }
//! impl_coerce!(Shape);
//!
//! #[derive(Clone)]
//! struct Square(f64);
//!
//! #[derive(Clone)]
//! struct Rect(f64, f64);
//!
//! impl Shape for Square {
//!     fn area(&self) -> f64 {
//!         self.0 * self.0
//!     }
//! }
//!
//! impl Shape for Rect {
//!     fn area(&self) -> f64 {
//!         self.0 * self.1
//!     }
//! }
//!
//! let mut shapes: PolyVec<dyn Shape> = PolyVec::new();
//! shapes.push(Square(2.0)).unwrap();
//! shapes.push(Rect(2.0, 3.0)).unwrap();
//!
//! let total: f64 = shapes.iter().map(|s| s.area()).sum();
//! assert_eq!(total, 10.0);
//! ```
//!
//! # Performance Characteristics
//!
//! - `push()`: amortized O(1); a growth pass relocates every element once
//! - `get()`, `Index`: O(1) through the descriptor
//! - `pop()`, `truncate()`, `clear()`: O(removed), capacity is kept
//! - `insert()`, `erase()`: O(elements after the position)
//! - swap and same-allocator move assignment: O(1)
//!
//! # Cloning Policies
//!
//! The second type parameter decides how elements are duplicated or relocated when the
//! block grows or the vector is copied:
//!
//! - [`VirtualCloning`] (default): through the capability set, which must extend
//!   [`PolyClone`]. Relocation is a move and cannot fail.
//! - [`DelegateCloning`]: through function pointers captured per element, so the capability
//!   set needs no cloning support. `DelegateCloning<false>` relocates by cloning, keeping
//!   the old block intact until every clone has succeeded.
//! - [`NoCloning`]: anything that needs a duplicate fails with
//!   [`MemError::CloningNotSupported`]. Reserve up front to grow such a vector.
//!
//! ```
//! use polyvec::{impl_coerce, NoCloning, PolyVec};
//!
//! trait Job {
//!     fn run(&self) -> u32;
//! }
//! impl_coerce!(Job);
//!
//! struct Task(u32);
//!
//! impl Job for Task {
//!     fn run(&self) -> u32 {
//!         self.0
//!     }
//! }
//!
//! let mut jobs: PolyVec<dyn Job, NoCloning> = PolyVec::new();
//! jobs.push(Task(1)).unwrap();
//! assert!(jobs.push(Task(2)).unwrap_err().is_cloning_not_supported());
//! assert_eq!(jobs.len(), 1);
//! ```
//!
//! ## `no_std` Compatibility
//!
//! Only `core` and `alloc` are required. Enable the optional `std` feature for
//! `std::error::Error` on the error types:
//! ```toml
//! [dependencies]
//! polyvec = { version = "0.1", features = ["std"] }
//! ```

extern crate alloc;

mod block;
mod error;
mod iter;
mod layout;
mod slot;
mod vec;

pub use error::PolyVecError;
pub use iter::{Iter, IterMut};
pub use polymem::{
    impl_coerce, AllocError, CloningPolicy, Coerce, DelegateCloning, Global, MemError,
    NoCloning, PolicyFor, PolyClone, Propagation, RawAllocator, VirtualCloning,
};
pub use vec::PolyVec;
