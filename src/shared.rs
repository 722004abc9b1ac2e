//! Interrupt-shared timer queue
//!
//! The timer interrupt (`tick`) and foreground code (`insert`/`remove`)
//! mutate the same list. Every call runs inside `critical_section::with`,
//! which masks the interrupt and restores the previous state on every exit
//! path. Nothing here blocks: on a single core the section is uncontended
//! by construction.
//!
//! Bare-metal targets provide the mask/unmask pair through
//! `critical_section::set_impl!`; host builds use the `std` feature.
//!
//! Author: Moroya Sakamoto

use core::cell::RefCell;

use critical_section::Mutex;

use crate::clock::ClockSource;
use crate::error::TimerError;
use crate::mailbox::Deliver;
use crate::node::{Target, TimerId};
use crate::queue::TimerQueue;

/// Timer queue behind a critical section, suitable for a `static`
pub struct SharedTimerQueue<C, D: Deliver, const N: usize> {
    inner: Mutex<RefCell<TimerQueue<C, D, N>>>,
}

impl<C: ClockSource, D: Deliver, const N: usize> SharedTimerQueue<C, D, N> {
    pub const fn new(queue: TimerQueue<C, D, N>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(queue)),
        }
    }

    /// Run `f` with the interrupt masked
    ///
    /// # Panics
    ///
    /// Panics if `f` (or a `Deliver` impl reached from it) re-enters this
    /// queue.
    pub fn with<R>(&self, f: impl FnOnce(&mut TimerQueue<C, D, N>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow(cs).borrow_mut()))
    }

    pub fn init(&self) {
        self.with(|q| q.init())
    }

    pub fn insert(&self, id: TimerId, delta: u64, reload: u64, target: Target<D::Handle>) {
        self.with(|q| q.insert(id, delta, reload, target))
    }

    pub fn try_insert(
        &self,
        id: TimerId,
        delta: u64,
        reload: u64,
        target: Target<D::Handle>,
    ) -> Result<(), TimerError> {
        self.with(|q| q.try_insert(id, delta, reload, target))
    }

    pub fn remove(&self, id: TimerId) -> bool {
        self.with(|q| q.remove(id))
    }

    /// Comparator interrupt entry point
    pub fn tick(&self) -> usize {
        self.with(|q| q.tick())
    }

    pub fn reschedule(&self, delta: u64) {
        self.with(|q| q.reschedule(delta))
    }

    pub fn peek_next_deadline(&self) -> Option<u64> {
        self.with(|q| q.peek_next_deadline())
    }

    pub fn is_queued(&self, id: TimerId) -> bool {
        self.with(|q| q.is_queued(id))
    }

    pub fn len(&self) -> usize {
        self.with(|q| q.len())
    }

    pub fn is_empty(&self) -> bool {
        self.with(|q| q.is_empty())
    }
}
