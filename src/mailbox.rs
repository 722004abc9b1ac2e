//! Message delivery — where fired timers go
//!
//! The queue hands every fire to a [`Deliver`] implementation and never
//! waits for it. The stock sink is a fixed ring mailbox: the timer
//! interrupt produces, foreground code consumes. A full mailbox drops the
//! message (non-blocking send).
//!
//! Index updates run inside `critical_section::with`, so a shared
//! `&Mailbox` may be used by any number of senders and receivers. Inside
//! the timer interrupt the section nests at no extra cost.
//!
//! Author: Moroya Sakamoto

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Message value carried by a timer fire
pub type Payload = u32;

/// Message delivery collaborator
///
/// `notify` must not block and must not call back into the timer queue:
/// it runs inside the queue's critical section.
pub trait Deliver {
    /// Opaque delivery handle stored in each timer node
    type Handle: Copy;

    /// Fire-and-forget hand-off of one timer fire
    fn notify(&mut self, handle: Self::Handle, payload: Payload);
}

/// Fixed ring mailbox
///
/// Fixed-size, no-alloc, interrupt-safe. Both ends take `&self`, so a
/// `static` mailbox can be shared by the timer interrupt (producer) and a
/// waiting subsystem (consumer).
pub struct Mailbox<const N: usize> {
    /// Ring storage
    slots: UnsafeCell<[Payload; N]>,
    /// Write index (advanced under the critical section)
    write_idx: AtomicUsize,
    /// Read index (advanced under the critical section)
    read_idx: AtomicUsize,
    /// Messages rejected because the ring was full
    dropped: AtomicU32,
}

// Slot storage is only touched inside a critical section.
unsafe impl<const N: usize> Sync for Mailbox<N> {}

impl<const N: usize> Mailbox<N> {
    /// Create an empty mailbox
    pub const fn new() -> Self {
        Self {
            slots: UnsafeCell::new([0; N]),
            write_idx: AtomicUsize::new(0),
            read_idx: AtomicUsize::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Send without blocking (producer side)
    ///
    /// Returns false and counts a drop if the mailbox is full.
    pub fn send(&self, payload: Payload) -> bool {
        critical_section::with(|_| {
            let write = self.write_idx.load(Ordering::Relaxed);
            let read = self.read_idx.load(Ordering::Acquire);
            let next_write = (write + 1) % N;

            if next_write == read {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }

            // SAFETY: the critical section excludes every other sender and
            // receiver, and slot `write` is not readable until published.
            unsafe { (*self.slots.get())[write] = payload };
            self.write_idx.store(next_write, Ordering::Release);
            true
        })
    }

    /// Receive without blocking (consumer side)
    pub fn recv(&self) -> Option<Payload> {
        critical_section::with(|_| {
            let read = self.read_idx.load(Ordering::Relaxed);
            let write = self.write_idx.load(Ordering::Acquire);

            if read == write {
                return None;
            }

            // SAFETY: slot `read` was published by a sender's Release store
            // and the critical section excludes every other receiver.
            let payload = unsafe { (*self.slots.get())[read] };
            self.read_idx.store((read + 1) % N, Ordering::Release);
            Some(payload)
        })
    }

    /// Number of pending messages
    pub fn len(&self) -> usize {
        let write = self.write_idx.load(Ordering::Relaxed);
        let read = self.read_idx.load(Ordering::Relaxed);
        if write >= read {
            write - read
        } else {
            N - read + write
        }
    }

    pub fn is_empty(&self) -> bool {
        self.write_idx.load(Ordering::Relaxed) == self.read_idx.load(Ordering::Relaxed)
    }

    /// Usable capacity (one slot distinguishes full from empty)
    pub fn capacity(&self) -> usize {
        N - 1
    }

    /// Messages dropped on a full mailbox
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for Mailbox<N> {
    fn default() -> Self {
        Self::new()
    }
}

fn send_or_warn<const N: usize>(mailbox: &Mailbox<N>, payload: Payload) {
    if !mailbox.send(payload) {
        log::warn!("mailbox full, dropped timer message {payload:#x}");
    }
}

impl<const N: usize> Deliver for Mailbox<N> {
    type Handle = ();

    fn notify(&mut self, _handle: (), payload: Payload) {
        send_or_warn(self, payload);
    }
}

impl<const N: usize> Deliver for &Mailbox<N> {
    type Handle = ();

    fn notify(&mut self, _handle: (), payload: Payload) {
        send_or_warn(self, payload);
    }
}

/// Fan-out over several mailboxes; the handle is the mailbox index
pub struct Router<'a, const N: usize> {
    mailboxes: &'a [Mailbox<N>],
    /// Messages addressed to an unknown mailbox
    misrouted: u32,
}

impl<'a, const N: usize> Router<'a, N> {
    pub const fn new(mailboxes: &'a [Mailbox<N>]) -> Self {
        Self {
            mailboxes,
            misrouted: 0,
        }
    }

    pub fn misrouted(&self) -> u32 {
        self.misrouted
    }
}

impl<const N: usize> Deliver for Router<'_, N> {
    type Handle = usize;

    fn notify(&mut self, handle: usize, payload: Payload) {
        match self.mailboxes.get(handle) {
            Some(mailbox) => send_or_warn(mailbox, payload),
            None => {
                self.misrouted += 1;
                log::warn!("no mailbox {handle}, dropped timer message {payload:#x}");
            }
        }
    }
}

/// Closure-backed delivery
pub struct FnDeliver<H, F> {
    f: F,
    _handle: PhantomData<fn(H)>,
}

impl<H, F> FnDeliver<H, F>
where
    H: Copy,
    F: FnMut(H, Payload),
{
    pub const fn new(f: F) -> Self {
        Self {
            f,
            _handle: PhantomData,
        }
    }
}

impl<H, F> Deliver for FnDeliver<H, F>
where
    H: Copy,
    F: FnMut(H, Payload),
{
    type Handle = H;

    fn notify(&mut self, handle: H, payload: Payload) {
        (self.f)(handle, payload)
    }
}
