#![allow(dead_code)]

use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;

use polymem::{impl_coerce, AllocError, Global, PolyClone, Propagation, RawAllocator};

pub trait Mode {
    const PROPAGATION: Propagation;
}

#[derive(Debug)]
pub struct Standard;
#[derive(Debug)]
pub struct Pinned;
#[derive(Debug)]
pub struct Propagating;

impl Mode for Standard {
    const PROPAGATION: Propagation = Propagation::DEFAULT;
}
impl Mode for Pinned {
    const PROPAGATION: Propagation = Propagation::NEVER;
}
impl Mode for Propagating {
    const PROPAGATION: Propagation = Propagation::ALWAYS;
}

#[derive(Debug, Default)]
pub struct Stats {
    pub live: Cell<usize>,
    pub total: Cell<usize>,
    pub fail: Cell<bool>,
}

/// Global-backed allocator that counts its blocks. Two instances are interchangeable iff
/// their ids match.
#[derive(Debug)]
pub struct Tracking<M> {
    pub id: u32,
    pub stats: Rc<Stats>,
    _mode: PhantomData<M>,
}

impl<M> Tracking<M> {
    pub fn new(id: u32) -> Self {
        Tracking {
            id,
            stats: Rc::new(Stats::default()),
            _mode: PhantomData,
        }
    }

    pub fn live(&self) -> usize {
        self.stats.live.get()
    }

    pub fn total(&self) -> usize {
        self.stats.total.get()
    }

    pub fn fail_next(&self, fail: bool) {
        self.stats.fail.set(fail);
    }
}

impl<M> Clone for Tracking<M> {
    fn clone(&self) -> Self {
        Tracking {
            id: self.id,
            stats: Rc::clone(&self.stats),
            _mode: PhantomData,
        }
    }
}

impl<M> PartialEq for Tracking<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M: Mode> RawAllocator for Tracking<M> {
    const PROPAGATION: Propagation = M::PROPAGATION;

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if self.stats.fail.get() {
            return Err(AllocError);
        }
        let ptr = Global.allocate(layout)?;
        self.stats.live.set(self.stats.live.get() + 1);
        self.stats.total.set(self.stats.total.get() + 1);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.stats.live.set(self.stats.live.get() - 1);
        unsafe { Global.deallocate(ptr, layout) }
    }
}

pub trait Shape: PolyClone {
    fn area(&self) -> f64;
    fn scale(&mut self, factor: f64);
}
impl_coerce!(Shape);

#[derive(Clone, Debug, PartialEq)]
pub struct Circle {
    pub radius: f64,
}

impl Shape for Circle {
    fn area(&self) -> f64 {
        3.0 * self.radius * self.radius
    }

    fn scale(&mut self, factor: f64) {
        self.radius *= factor;
    }
}

/// Too large for the default inline threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub sides: [f64; 16],
}

impl Polygon {
    pub fn regular(side: f64) -> Self {
        Polygon { sides: [side; 16] }
    }
}

impl Shape for Polygon {
    fn area(&self) -> f64 {
        self.sides.iter().sum()
    }

    fn scale(&mut self, factor: f64) {
        for side in &mut self.sides {
            *side *= factor;
        }
    }
}

/// Counts how many times it was dropped.
#[derive(Clone, Debug)]
pub struct Counted {
    pub value: f64,
    pub drops: Rc<Cell<usize>>,
}

impl Counted {
    pub fn new(value: f64, drops: &Rc<Cell<usize>>) -> Self {
        Counted {
            value,
            drops: Rc::clone(drops),
        }
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

impl Shape for Counted {
    fn area(&self) -> f64 {
        self.value
    }

    fn scale(&mut self, factor: f64) {
        self.value *= factor;
    }
}

/// A capability set without any cloning support of its own.
pub trait Label {
    fn text(&self) -> String;
}
impl_coerce!(Label);

#[derive(Clone)]
pub struct Tag(pub &'static str);

impl Label for Tag {
    fn text(&self) -> String {
        self.0.to_string()
    }
}
