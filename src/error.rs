//! Timer queue errors
//!
//! Only precondition violations are reported. Clock and delivery
//! collaborators are register writes / ring pushes and never fail.
//!
//! Author: Moroya Sakamoto

use crate::node::TimerId;

/// Checked-insert failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    /// `init` has not run yet
    #[error("timer queue used before init")]
    NotInitialized,
    /// Slot index outside the queue's node table
    #[error("timer slot {slot} out of range (capacity {capacity})")]
    InvalidSlot { slot: usize, capacity: usize },
    /// Node is already linked into the queue
    #[error("timer {0:?} is already queued")]
    AlreadyQueued(TimerId),
}
