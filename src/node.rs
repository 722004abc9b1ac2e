//! Timer node — one pending alarm, stored in the queue's static slot table
//!
//! Each node keeps its time relative to its predecessor (delta list),
//! an optional reload period and an opaque delivery target.
//!
//! Author: Moroya Sakamoto

use crate::mailbox::Payload;

/// Caller-owned identity of a timer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u16);

impl TimerId {
    /// Slot index in the queue's node table
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a fired timer is delivered
///
/// Never inspected by the queue; handed to [`crate::Deliver::notify`] as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target<H> {
    /// Delivery handle (mailbox reference, index, ...)
    pub handle: H,
    /// Message value sent on every fire
    pub payload: Payload,
}

impl<H> Target<H> {
    pub const fn new(handle: H, payload: Payload) -> Self {
        Self { handle, payload }
    }
}

/// Static timer descriptor — no heap, intrusive index links
#[derive(Debug, Clone, Copy)]
pub struct TimerNode<H> {
    /// Ticks after the predecessor's expiry
    pub(crate) delta: u64,
    /// Reload period (0 = one-shot)
    pub(crate) reload: u64,
    /// Delivery target, set on insert
    pub(crate) target: Option<Target<H>>,
    /// Currently in the queue
    pub(crate) linked: bool,
    pub(crate) prev: usize,
    pub(crate) next: usize,
}

impl<H: Copy> TimerNode<H> {
    /// Unlinked slot
    pub const fn empty() -> Self {
        Self {
            delta: 0,
            reload: 0,
            target: None,
            linked: false,
            prev: 0,
            next: 0,
        }
    }

    /// Stored delta (relative to predecessor)
    pub fn delta(&self) -> u64 {
        self.delta
    }

    /// Reload period, 0 for one-shot timers
    pub fn reload(&self) -> u64 {
        self.reload
    }

    pub fn is_periodic(&self) -> bool {
        self.reload != 0
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub fn target(&self) -> Option<Target<H>> {
        self.target
    }
}
