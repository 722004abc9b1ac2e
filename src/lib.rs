//! ALICE-TimerQ — tick-delta timer queue
//!
//! Don't poll deadlines, sort them once.
//!
//! One-shot and periodic alarms on a free-running hardware counter:
//! - Delta list: each node stores ticks after its predecessor, O(1) per tick
//! - Static node table (no heap, no allocation)
//! - Single comparator armed for the earliest deadline, disarmed when idle
//! - Wraparound-safe elapsed arithmetic on the counter
//! - Fires delivered fire-and-forget to fixed ring mailboxes
//! - Interrupt/foreground sharing through one critical section
//!
//! Author: Moroya Sakamoto

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod clock;
pub mod error;
pub mod mailbox;
pub mod node;
pub mod queue;
pub mod shared;
pub mod sim;

#[cfg(feature = "ffi")]
pub mod ffi;
#[cfg(feature = "python")]
pub mod python;

#[cfg(test)]
mod proptests;

pub use clock::{ClockSource, CountRegister, SoftClock, WideCounter};
pub use error::TimerError;
pub use mailbox::{Deliver, FnDeliver, Mailbox, Payload, Router};
pub use node::{Target, TimerId, TimerNode};
pub use queue::{QueueStats, TimerQueue, TimerQueueConfig};
pub use shared::SharedTimerQueue;
pub use sim::{SimStats, Simulator};
