//! Lock-free values shared with the realtime thread.

use std::sync::atomic::{AtomicI8, Ordering};

/// Cache-line aligned transpose amount in semitones.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicShift {
    value: AtomicI8,
}

impl AtomicShift {
    pub fn new(value: i8) -> Self {
        Self {
            value: AtomicI8::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> i8 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: i8) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: i8) -> i8 {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicShift {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicShift {
    fn default() -> Self {
        Self::new(0)
    }
}
