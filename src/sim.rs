//! Simulator — software interrupt loop for a timer queue
//!
//! Combines a `SoftClock` with a queue and plays the role of the
//! comparator interrupt: time is advanced up to each comparator match and
//! `tick` is invoked there, exactly as the hardware would.
//!
//! Author: Moroya Sakamoto

use crate::clock::SoftClock;
use crate::mailbox::Deliver;
use crate::queue::TimerQueue;

/// Simulated clock + queue
pub struct Simulator<D: Deliver, const N: usize> {
    /// The queue under test
    pub queue: TimerQueue<SoftClock, D, N>,
    /// Comparator interrupts serviced
    interrupts: u64,
    /// Fires across all interrupts
    fired: u64,
}

impl<D: Deliver, const N: usize> Simulator<D, N> {
    /// Initialized queue on the given clock
    pub fn new(clock: SoftClock, deliver: D) -> Self {
        let mut queue = TimerQueue::new(clock, deliver);
        queue.init();
        Self {
            queue,
            interrupts: 0,
            fired: 0,
        }
    }

    /// One tick per microsecond, counter at 0
    pub fn testing(deliver: D) -> Self {
        Self::new(SoftClock::software(), deliver)
    }

    /// Advance time by `ticks`, servicing every comparator match on the way
    ///
    /// Returns the number of timer fires.
    pub fn advance(&mut self, ticks: u64) -> usize {
        let mut remaining = ticks;
        let mut fired = 0;

        loop {
            if self.queue.clock_mut().take_pending() {
                fired += self.interrupt();
                continue;
            }

            match self.queue.clock().ticks_until_match() {
                Some(distance) if distance <= remaining => {
                    self.queue.clock_mut().advance(distance);
                    remaining -= distance;
                }
                _ => {
                    self.queue.clock_mut().advance(remaining);
                    return fired;
                }
            }
        }
    }

    /// Run for `total` ticks in steps of `step` (testing)
    pub fn run_for(&mut self, total: u64, step: u64) -> SimStats {
        let step = step.max(1);
        let start_interrupts = self.interrupts;
        let mut elapsed = 0u64;
        let mut fired = 0u64;

        while elapsed < total {
            let chunk = step.min(total - elapsed);
            fired += self.advance(chunk) as u64;
            elapsed += chunk;
        }

        SimStats {
            elapsed,
            interrupts: self.interrupts - start_interrupts,
            fired,
            queued: self.queue.len(),
        }
    }

    /// Current counter value
    pub fn now(&self) -> u64 {
        self.queue.clock().now()
    }

    /// Comparator interrupts serviced so far
    pub fn interrupts(&self) -> u64 {
        self.interrupts
    }

    /// Timer fires so far
    pub fn total_fired(&self) -> u64 {
        self.fired
    }

    fn interrupt(&mut self) -> usize {
        self.interrupts += 1;
        let fired = self.queue.tick();
        self.fired += fired as u64;
        fired
    }
}

/// Simulation statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimStats {
    /// Ticks simulated
    pub elapsed: u64,
    /// Comparator interrupts serviced
    pub interrupts: u64,
    /// Timer fires delivered
    pub fired: u64,
    /// Timers still queued at the end
    pub queued: usize,
}
