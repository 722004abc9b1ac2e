//! Tick-delta timer queue
//!
//! Circular doubly-linked delta list over a static node table. Each node
//! stores its expiry relative to its predecessor, so servicing a tick only
//! ever touches the head. Sentinel is slot index `N`; `head.next == N`
//! means empty.
//!
//! Invariant: the remaining ticks of node k (as of `last_service`) is the
//! sum of stored deltas from the head through k.
//!
//! Author: Moroya Sakamoto

use crate::clock::ClockSource;
use crate::error::TimerError;
use crate::mailbox::Deliver;
use crate::node::{Target, TimerId, TimerNode};

/// Default cap on fires handled by one `tick`
pub const DEFAULT_FIRE_BUDGET: usize = 64;

/// Runtime tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerQueueConfig {
    /// Max fires per `tick` before yielding the critical section
    pub fire_budget: usize,
}

impl TimerQueueConfig {
    pub const fn new() -> Self {
        Self {
            fire_budget: DEFAULT_FIRE_BUDGET,
        }
    }

    pub const fn with_fire_budget(mut self, fire_budget: usize) -> Self {
        self.fire_budget = fire_budget;
        self
    }
}

impl Default for TimerQueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// `tick` invocations
    pub ticks: u64,
    /// Timer fires delivered
    pub fired: u64,
    /// Periodic reinsertions
    pub reloaded: u64,
    /// Explicit cancellations
    pub removed: u64,
    /// Ticks cut short by the fire budget
    pub budget_exhausted: u32,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    prev: usize,
    next: usize,
}

/// Delta-list timer queue with `N` node slots
///
/// Not synchronized by itself: wrap it in [`crate::SharedTimerQueue`] when
/// the timer interrupt and foreground code both reach it.
///
/// `N` is bounded by the `TimerId` range:
///
/// ```compile_fail
/// use alice_timerq::{Mailbox, SoftClock, TimerQueue};
///
/// let q: TimerQueue<SoftClock, Mailbox<4>, 70_000> =
///     TimerQueue::new(SoftClock::software(), Mailbox::new());
/// ```
pub struct TimerQueue<C, D: Deliver, const N: usize> {
    /// Counter / comparator pair
    clock: C,
    /// Fire notifications
    deliver: D,
    /// Static node table
    nodes: [TimerNode<D::Handle>; N],
    /// Sentinel links
    head: Link,
    /// Counter value the stored deltas are measured from
    last_service: u64,
    /// Queued node count
    len: usize,
    initialized: bool,
    config: TimerQueueConfig,
    stats: QueueStats,
}

impl<C: ClockSource, D: Deliver, const N: usize> TimerQueue<C, D, N> {
    /// Sentinel slot; every other slot must be addressable by a `TimerId`
    const HEAD: usize = {
        assert!(N <= u16::MAX as usize, "timer queue slots exceed TimerId range");
        N
    };

    /// Uninitialized queue; call [`init`](Self::init) before use
    pub const fn new(clock: C, deliver: D) -> Self {
        Self::with_config(clock, deliver, TimerQueueConfig::new())
    }

    pub const fn with_config(clock: C, deliver: D, config: TimerQueueConfig) -> Self {
        Self {
            clock,
            deliver,
            nodes: [TimerNode::empty(); N],
            head: Link {
                prev: Self::HEAD,
                next: Self::HEAD,
            },
            last_service: 0,
            len: 0,
            initialized: false,
            config,
            stats: QueueStats {
                ticks: 0,
                fired: 0,
                reloaded: 0,
                removed: 0,
                budget_exhausted: 0,
            },
        }
    }

    /// Empty the queue and start measuring from the current counter value
    pub fn init(&mut self) {
        for node in self.nodes.iter_mut() {
            *node = TimerNode::empty();
        }
        self.head = Link {
            prev: Self::HEAD,
            next: Self::HEAD,
        };
        self.len = 0;
        self.last_service = self.clock.read_counter();
        self.clock.disarm();
        self.initialized = true;
        log::debug!("timer queue init at {} ({} slots)", self.last_service, N);
    }

    /// Queue `id` to fire `delta` ticks from now, then every `reload` ticks
    ///
    /// Precondition violations (not initialized, bad slot, already queued)
    /// assert in debug builds and are ignored in release builds.
    pub fn insert(&mut self, id: TimerId, delta: u64, reload: u64, target: Target<D::Handle>) {
        if let Err(err) = self.try_insert(id, delta, reload, target) {
            log::error!("timer insert rejected: {err}");
            debug_assert!(false, "timer insert rejected: {err}");
        }
    }

    /// Checked [`insert`](Self::insert)
    pub fn try_insert(
        &mut self,
        id: TimerId,
        delta: u64,
        reload: u64,
        target: Target<D::Handle>,
    ) -> Result<(), TimerError> {
        if !self.initialized {
            return Err(TimerError::NotInitialized);
        }
        let idx = self.slot(id)?;
        if self.nodes[idx].linked {
            return Err(TimerError::AlreadyQueued(id));
        }

        let overdue = self.catch_up();
        self.nodes[idx].reload = reload;
        self.nodes[idx].target = Some(target);
        let is_head = self.link_sorted(idx, delta.saturating_add(overdue));
        log::trace!("timer {} queued: delta {delta}, reload {reload}", idx);

        if is_head {
            self.reschedule(self.nodes[idx].delta);
        }
        Ok(())
    }

    /// Periodic timer whose first fire is one `interval` away
    pub fn start_periodic(&mut self, id: TimerId, interval: u64, target: Target<D::Handle>) {
        self.insert(id, interval, interval, target);
    }

    /// Cancel `id`; false if it was not queued
    pub fn remove(&mut self, id: TimerId) -> bool {
        let idx = id.index();
        match self.nodes.get(idx) {
            Some(node) if node.linked => {}
            _ => return false,
        }

        let was_head = self.head.next == idx;
        if was_head {
            self.catch_up();
        }

        let next = self.nodes[idx].next;
        if next != Self::HEAD {
            self.nodes[next].delta = self.nodes[next].delta.saturating_add(self.nodes[idx].delta);
        }
        self.unlink(idx);
        self.stats.removed += 1;
        log::trace!("timer {idx} removed");

        if was_head {
            self.rearm();
        }
        true
    }

    /// Service the comparator interrupt: fire everything that is due
    ///
    /// Returns the number of fires delivered. Leaves the comparator armed
    /// for the new head, or disarmed if the queue drained.
    pub fn tick(&mut self) -> usize {
        self.stats.ticks += 1;
        if self.head.next == Self::HEAD {
            self.clock.disarm();
            return 0;
        }

        let now = self.clock.read_counter();
        let mut elapsed = now.wrapping_sub(self.last_service);
        self.last_service = now;

        let mut fired = 0;
        while let Some(idx) = self.first() {
            let delta = self.nodes[idx].delta;
            if delta > elapsed {
                self.nodes[idx].delta = delta - elapsed;
                self.reschedule(delta - elapsed);
                return fired;
            }

            if fired >= self.config.fire_budget.max(1) {
                // Resume from the last fire instant on the next interrupt.
                self.stats.budget_exhausted += 1;
                self.last_service = now.wrapping_sub(elapsed);
                log::warn!("fire budget exhausted, {elapsed} ticks left to service");
                self.reschedule(0);
                return fired;
            }

            self.unlink(idx);
            elapsed -= delta;
            self.fire(idx);
            fired += 1;
        }

        self.clock.disarm();
        fired
    }

    /// Arm the comparator `delta` ticks from now
    pub fn reschedule(&mut self, delta: u64) {
        let at = self.clock.read_counter().wrapping_add(delta);
        log::trace!("comparator armed at {at} (+{delta})");
        self.clock.write_comparator(at);
    }

    /// Ticks from the last service instant to the head's expiry
    pub fn peek_next_deadline(&self) -> Option<u64> {
        self.first().map(|idx| self.nodes[idx].delta)
    }

    /// Counter value at which the head expires
    pub fn next_deadline_at(&self) -> Option<u64> {
        self.peek_next_deadline()
            .map(|delta| self.last_service.wrapping_add(delta))
    }

    /// Remaining ticks of a queued node (prefix sum of deltas)
    pub fn remaining(&self, id: TimerId) -> Option<u64> {
        let mut total = 0u64;
        for (queued, delta) in self.iter() {
            total += delta;
            if queued == id {
                return Some(total);
            }
        }
        None
    }

    /// Queue order view of `(id, stored delta)`
    pub fn iter(&self) -> impl Iterator<Item = (TimerId, u64)> + '_ {
        let mut cur = self.head.next;
        core::iter::from_fn(move || {
            if cur == Self::HEAD {
                return None;
            }
            let node = &self.nodes[cur];
            let item = (TimerId(cur as u16), node.delta);
            cur = node.next;
            Some(item)
        })
    }

    pub fn is_queued(&self, id: TimerId) -> bool {
        self.nodes.get(id.index()).is_some_and(|n| n.linked)
    }

    pub fn node(&self, id: TimerId) -> Option<&TimerNode<D::Handle>> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.next == Self::HEAD
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Counter value the stored deltas are measured from
    pub fn last_service_time(&self) -> u64 {
        self.last_service
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    pub fn config(&self) -> TimerQueueConfig {
        self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn deliver(&self) -> &D {
        &self.deliver
    }

    pub fn deliver_mut(&mut self) -> &mut D {
        &mut self.deliver
    }

    fn slot(&self, id: TimerId) -> Result<usize, TimerError> {
        let idx = id.index();
        if idx >= N {
            return Err(TimerError::InvalidSlot {
                slot: idx,
                capacity: N,
            });
        }
        Ok(idx)
    }

    fn first(&self) -> Option<usize> {
        let idx = self.head.next;
        (idx != Self::HEAD).then_some(idx)
    }

    /// Rebase stored deltas onto the current counter value
    ///
    /// Only possible while the head is still in the future. An overdue head
    /// keeps `last_service` where it is so the next `tick` fires it (and
    /// reloads it) in its own frame; the ticks since `last_service` are
    /// returned and a new node must add them to its delta.
    fn catch_up(&mut self) -> u64 {
        let now = self.clock.read_counter();
        let elapsed = now.wrapping_sub(self.last_service);
        match self.first() {
            Some(idx) if self.nodes[idx].delta <= elapsed => elapsed,
            Some(idx) => {
                self.nodes[idx].delta -= elapsed;
                self.last_service = now;
                0
            }
            None => {
                self.last_service = now;
                0
            }
        }
    }

    /// Walk from the head and link `idx` at its sorted position.
    /// Returns true if it became the head.
    fn link_sorted(&mut self, idx: usize, delta: u64) -> bool {
        let mut budget = delta;
        let mut cur = self.head.next;
        while cur != Self::HEAD {
            let d = self.nodes[cur].delta;
            if budget < d {
                break;
            }
            budget -= d;
            cur = self.nodes[cur].next;
        }

        self.nodes[idx].delta = budget;
        if cur != Self::HEAD {
            self.nodes[cur].delta -= budget;
        }
        self.link_before(idx, cur);
        self.head.next == idx
    }

    fn fire(&mut self, idx: usize) {
        let node = self.nodes[idx];
        if let Some(target) = node.target {
            self.deliver.notify(target.handle, target.payload);
        }
        self.stats.fired += 1;
        log::debug!("timer {idx} fired (payload {:#x?})", node.target.map(|t| t.payload));

        if node.reload != 0 {
            self.stats.reloaded += 1;
            self.link_sorted(idx, node.reload);
        }
    }

    /// Arm for the head's expiry, or immediately if it is already due
    fn rearm(&mut self) {
        match self.first() {
            Some(idx) => {
                let elapsed = self.clock.read_counter().wrapping_sub(self.last_service);
                self.reschedule(self.nodes[idx].delta.saturating_sub(elapsed));
            }
            None => self.clock.disarm(),
        }
    }

    fn next_of(&self, i: usize) -> usize {
        if i == Self::HEAD {
            self.head.next
        } else {
            self.nodes[i].next
        }
    }

    fn prev_of(&self, i: usize) -> usize {
        if i == Self::HEAD {
            self.head.prev
        } else {
            self.nodes[i].prev
        }
    }

    fn set_next(&mut self, i: usize, next: usize) {
        if i == Self::HEAD {
            self.head.next = next;
        } else {
            self.nodes[i].next = next;
        }
    }

    fn set_prev(&mut self, i: usize, prev: usize) {
        if i == Self::HEAD {
            self.head.prev = prev;
        } else {
            self.nodes[i].prev = prev;
        }
    }

    fn link_before(&mut self, idx: usize, at: usize) {
        let prev = self.prev_of(at);
        self.nodes[idx].prev = prev;
        self.nodes[idx].next = at;
        self.nodes[idx].linked = true;
        self.set_next(prev, idx);
        self.set_prev(at, idx);
        self.len += 1;
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.nodes[idx].prev;
        let next = self.next_of(idx);
        self.set_next(prev, next);
        self.set_prev(next, prev);
        self.nodes[idx].linked = false;
        self.len -= 1;
    }
}
