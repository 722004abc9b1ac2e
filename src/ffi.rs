//! C-ABI FFI — one global timer queue behind `timer_queue_*`
//!
//! The host supplies the counter/comparator and delivery collaborators as
//! C function pointers at `timer_queue_init`. Every call runs inside the
//! critical section.
//!
//! Author: Moroya Sakamoto

use core::cell::RefCell;

use critical_section::Mutex;

use crate::clock::ClockSource;
use crate::mailbox::{Deliver, Payload};
use crate::node::{Target, TimerId};
use crate::queue::TimerQueue;

/// Node slots of the global queue
pub const FFI_SLOTS: usize = 32;

/// Counter / comparator callbacks
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TimerClockOps {
    pub read_counter: extern "C" fn() -> u64,
    pub write_comparator: extern "C" fn(u64),
    pub disarm: extern "C" fn(),
}

/// Fire callback: `(handle, payload)`, must not block
pub type TimerNotifyFn = extern "C" fn(usize, u32);

struct FfiClock(TimerClockOps);

impl ClockSource for FfiClock {
    fn read_counter(&mut self) -> u64 {
        (self.0.read_counter)()
    }

    fn write_comparator(&mut self, value: u64) {
        (self.0.write_comparator)(value)
    }

    fn disarm(&mut self) {
        (self.0.disarm)()
    }
}

struct FfiDeliver(TimerNotifyFn);

impl Deliver for FfiDeliver {
    type Handle = usize;

    fn notify(&mut self, handle: usize, payload: Payload) {
        (self.0)(handle, payload)
    }
}

type FfiQueue = TimerQueue<FfiClock, FfiDeliver, FFI_SLOTS>;

static QUEUE: Mutex<RefCell<Option<FfiQueue>>> = Mutex::new(RefCell::new(None));

fn with_queue<R>(f: impl FnOnce(&mut FfiQueue) -> R) -> Option<R> {
    critical_section::with(|cs| QUEUE.borrow(cs).borrow_mut().as_mut().map(f))
}

/// Install collaborators and reset the queue
#[no_mangle]
pub extern "C" fn timer_queue_init(clock: TimerClockOps, notify: TimerNotifyFn) {
    critical_section::with(|cs| {
        let mut queue = TimerQueue::new(FfiClock(clock), FfiDeliver(notify));
        queue.init();
        *QUEUE.borrow(cs).borrow_mut() = Some(queue);
    });
}

/// Queue `slot`. Returns 0 on success, -1 on a precondition violation.
#[no_mangle]
pub extern "C" fn timer_queue_insert(
    slot: u16,
    delta_ticks: u64,
    reload_ticks: u64,
    handle: usize,
    payload: u32,
) -> i32 {
    let result = with_queue(|q| {
        q.try_insert(TimerId(slot), delta_ticks, reload_ticks, Target::new(handle, payload))
    });
    match result {
        Some(Ok(())) => 0,
        Some(Err(err)) => {
            log::error!("timer_queue_insert: {err}");
            -1
        }
        None => {
            log::error!("timer_queue_insert before timer_queue_init");
            -1
        }
    }
}

/// Cancel `slot`; true if it was queued
#[no_mangle]
pub extern "C" fn timer_queue_remove(slot: u16) -> bool {
    with_queue(|q| q.remove(TimerId(slot))).unwrap_or(false)
}

/// Comparator interrupt entry. Returns the number of fires.
#[no_mangle]
pub extern "C" fn timer_queue_tick() -> u32 {
    with_queue(|q| q.tick() as u32).unwrap_or(0)
}

/// Ticks to the head's expiry, measured from the last service instant
///
/// # Safety
///
/// `out` must be null or valid for a `u64` write.
#[no_mangle]
pub unsafe extern "C" fn timer_queue_peek_next_deadline(out: *mut u64) -> bool {
    match with_queue(|q| q.peek_next_deadline()).flatten() {
        Some(delta) => {
            if !out.is_null() {
                // SAFETY: caller guarantees `out` is writable.
                unsafe { out.write(delta) };
            }
            true
        }
        None => false,
    }
}
