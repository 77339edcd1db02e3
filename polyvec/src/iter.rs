use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::slot::Slot;

/// Iterator over the elements of a `PolyVec`
pub struct Iter<'a, I: ?Sized, P> {
    base: NonNull<u8>,
    front: usize,
    back: usize,
    _marker: PhantomData<(&'a I, &'a P)>,
}

impl<'a, I: ?Sized, P> Iter<'a, I, P> {
    pub(crate) fn new(base: NonNull<u8>, len: usize) -> Self {
        Self {
            base,
            front: 0,
            back: len,
            _marker: PhantomData,
        }
    }

    fn item(&self, index: usize) -> &'a I {
        // Safe: `index` is below the length the iterator was created with, and the vector
        // stays borrowed for `'a`
        unsafe {
            Slot::<I, P>::at(self.base, index)
                .as_ref()
                .object(self.base)
                .as_ref()
        }
    }
}

impl<I: ?Sized, P> Clone for Iter<'_, I, P> {
    fn clone(&self) -> Self {
        Self {
            base: self.base,
            front: self.front,
            back: self.back,
            _marker: PhantomData,
        }
    }
}

impl<'a, I: ?Sized, P> Iterator for Iter<'a, I, P> {
    type Item = &'a I;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            let result = self.item(self.front);
            self.front += 1;
            Some(result)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.front = self.front.saturating_add(n).min(self.back);
        self.next()
    }
}

impl<I: ?Sized, P> DoubleEndedIterator for Iter<'_, I, P> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            self.back -= 1;
            Some(self.item(self.back))
        } else {
            None
        }
    }

    fn nth_back(&mut self, n: usize) -> Option<Self::Item> {
        self.back = self.back.saturating_sub(n).max(self.front);
        self.next_back()
    }
}

impl<I: ?Sized, P> ExactSizeIterator for Iter<'_, I, P> {}

impl<I: ?Sized, P> FusedIterator for Iter<'_, I, P> {}

/// Mutable iterator over the elements of a `PolyVec`
pub struct IterMut<'a, I: ?Sized, P> {
    base: NonNull<u8>,
    front: usize,
    back: usize,
    _marker: PhantomData<(&'a mut I, &'a P)>,
}

impl<'a, I: ?Sized, P> IterMut<'a, I, P> {
    pub(crate) fn new(base: NonNull<u8>, len: usize) -> Self {
        Self {
            base,
            front: 0,
            back: len,
            _marker: PhantomData,
        }
    }

    fn item(&mut self, index: usize) -> &'a mut I {
        // Safe: each index is handed out at most once, and the vector stays borrowed
        // exclusively for `'a`
        unsafe {
            Slot::<I, P>::at(self.base, index)
                .as_ref()
                .object(self.base)
                .as_mut()
        }
    }
}

impl<'a, I: ?Sized, P> Iterator for IterMut<'a, I, P> {
    type Item = &'a mut I;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            let index = self.front;
            self.front += 1;
            Some(self.item(index))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.front = self.front.saturating_add(n).min(self.back);
        self.next()
    }
}

impl<I: ?Sized, P> DoubleEndedIterator for IterMut<'_, I, P> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            self.back -= 1;
            let index = self.back;
            Some(self.item(index))
        } else {
            None
        }
    }

    fn nth_back(&mut self, n: usize) -> Option<Self::Item> {
        self.back = self.back.saturating_sub(n).max(self.front);
        self.next_back()
    }
}

impl<I: ?Sized, P> ExactSizeIterator for IterMut<'_, I, P> {}

impl<I: ?Sized, P> FusedIterator for IterMut<'_, I, P> {}
