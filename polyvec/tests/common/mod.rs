#![allow(dead_code)]

use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;

use polyvec::{impl_coerce, AllocError, Global, PolyClone, Propagation, RawAllocator};

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
    fn id(&self) -> u32;
    fn set_id(&mut self, id: u32);
    /// Address-derived check used by the alignment tests.
    fn addr(&self) -> usize {
        self as *const Self as *const u8 as usize
    }
    fn align(&self) -> usize;
}
impl_coerce!(Shape);

/// 16 bytes, aligned to 8.
#[derive(Clone, Debug, PartialEq)]
pub struct Small {
    pub id: u32,
    pub value: u64,
}

impl Small {
    pub fn new(id: u32) -> Self {
        Small {
            id,
            value: u64::from(id) * 3,
        }
    }
}

/// 144 bytes, aligned to 16.
#[derive(Clone, Debug, PartialEq)]
#[repr(align(16))]
pub struct Large {
    pub id: u32,
    pub payload: [u8; 137],
}

impl Large {
    pub fn new(id: u32) -> Self {
        Large {
            id,
            payload: [id as u8; 137],
        }
    }
}

/// 64 bytes, aligned to 64.
#[derive(Clone, Debug, PartialEq)]
#[repr(align(64))]
pub struct Wide {
    pub id: u32,
}

macro_rules! shape {
    ($ty:ty) => {
        impl Shape for $ty {
            fn id(&self) -> u32 {
                self.id
            }

            fn set_id(&mut self, id: u32) {
                self.id = id;
            }

            fn align(&self) -> usize {
                std::mem::align_of::<$ty>()
            }
        }
    };
}

shape!(Small);
shape!(Large);
shape!(Wide);

/// Counts drops and clones, and panics on the clone numbered `panic_on` (if set).
#[derive(Debug)]
pub struct Counted {
    pub id: u32,
    pub probe: Rc<Probe>,
}

#[derive(Debug, Default)]
pub struct Probe {
    pub drops: Cell<usize>,
    pub clones: Cell<usize>,
    pub panic_on: Cell<Option<usize>>,
    pub panic_on_drop: Cell<Option<u32>>,
}

impl Probe {
    pub fn new() -> Rc<Self> {
        Rc::new(Probe::default())
    }
}

impl Counted {
    pub fn new(id: u32, probe: &Rc<Probe>) -> Self {
        Counted {
            id,
            probe: Rc::clone(probe),
        }
    }
}

impl Clone for Counted {
    fn clone(&self) -> Self {
        let n = self.probe.clones.get() + 1;
        if self.probe.panic_on.get() == Some(n) {
            panic!("clone number {n} refused");
        }
        self.probe.clones.set(n);
        Counted {
            id: self.id,
            probe: Rc::clone(&self.probe),
        }
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.probe.drops.set(self.probe.drops.get() + 1);
        if self.probe.panic_on_drop.get() == Some(self.id) {
            self.probe.panic_on_drop.set(None);
            panic!("drop of {} refused", self.id);
        }
    }
}

shape!(Counted);

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

#[derive(Clone)]
pub struct Caption(pub String);

impl Label for Caption {
    fn text(&self) -> String {
        self.0.clone()
    }
}

pub fn ids<P, A: RawAllocator>(vec: &polyvec::PolyVec<dyn Shape, P, A>) -> Vec<u32> {
    vec.iter().map(|s| s.id()).collect()
}
