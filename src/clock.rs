//! Clock source — free-running counter plus one comparator
//!
//! The queue's only notion of time. On real hardware this wraps the CPU
//! count/compare pair (or SysTick / MTIME). For testing, `SoftClock` is a
//! software counter whose comparator is checked as time is advanced.
//!
//! Elapsed time is always `now.wrapping_sub(then)`: correct across counter
//! wraparound as long as no single gap exceeds half the counter range.
//!
//! Author: Moroya Sakamoto

/// Hardware counter / comparator boundary
pub trait ClockSource {
    /// Current counter value, widened to 64 bits. Never blocks.
    fn read_counter(&mut self) -> u64;

    /// Arm the interrupt for when `read_counter()` reaches `value`
    fn write_comparator(&mut self, value: u64);

    /// Suppress the next interrupt
    fn disarm(&mut self);
}

/// Software clock for host builds and tests
///
/// Size: 40 bytes
#[derive(Debug, Clone)]
pub struct SoftClock {
    /// Current counter value (ticks)
    now: u64,
    /// Counter frequency (ticks per microsecond)
    ticks_per_us: u32,
    /// Armed comparator value
    comparator: Option<u64>,
    /// Comparator reached since last `take_pending`
    pending: bool,
    /// Counter wraparounds
    wraps: u32,
}

impl SoftClock {
    /// Software clock ticking at `clock_hz`
    pub const fn new(clock_hz: u32) -> Self {
        Self {
            now: 0,
            ticks_per_us: clock_hz / 1_000_000,
            comparator: None,
            pending: false,
            wraps: 0,
        }
    }

    /// One tick per microsecond
    pub const fn software() -> Self {
        Self::new(1_000_000)
    }

    /// Start the counter at an arbitrary value (wraparound tests)
    pub const fn starting_at(now: u64) -> Self {
        let mut clock = Self::software();
        clock.now = now;
        clock
    }

    /// Advance the counter, latching the comparator if it is crossed
    pub fn advance(&mut self, ticks: u64) {
        if let Some(distance) = self.ticks_until_match() {
            if distance <= ticks {
                self.comparator = None;
                self.pending = true;
            }
        }
        let new = self.now.wrapping_add(ticks);
        if new < self.now {
            self.wraps += 1;
        }
        self.now = new;
    }

    /// Current counter value
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Armed comparator value
    pub fn comparator(&self) -> Option<u64> {
        self.comparator
    }

    pub fn is_armed(&self) -> bool {
        self.comparator.is_some()
    }

    /// Ticks until the armed comparator matches
    pub fn ticks_until_match(&self) -> Option<u64> {
        self.comparator.map(|c| c.wrapping_sub(self.now))
    }

    /// Consume a latched comparator interrupt
    pub fn take_pending(&mut self) -> bool {
        core::mem::take(&mut self.pending)
    }

    /// Number of counter wraparounds
    pub fn wraps(&self) -> u32 {
        self.wraps
    }

    /// Counter frequency (ticks per microsecond)
    pub fn ticks_per_us(&self) -> u32 {
        self.ticks_per_us
    }

    /// Microseconds → ticks
    pub fn ticks_from_us(&self, us: u64) -> u64 {
        us.saturating_mul(self.ticks_per_us as u64)
    }

    /// Ticks → microseconds
    pub fn us_from_ticks(&self, ticks: u64) -> u64 {
        ticks / self.ticks_per_us.max(1) as u64
    }
}

impl ClockSource for SoftClock {
    fn read_counter(&mut self) -> u64 {
        self.now
    }

    fn write_comparator(&mut self, value: u64) {
        if value == self.now {
            // Already reached: raise immediately.
            self.comparator = None;
            self.pending = true;
        } else {
            self.comparator = Some(value);
        }
    }

    fn disarm(&mut self) {
        self.comparator = None;
        self.pending = false;
    }
}

/// Native 32-bit count/compare register pair
pub trait CountRegister {
    fn read_count(&mut self) -> u32;
    fn write_compare(&mut self, value: u32);
    fn disable_compare(&mut self);
}

/// Widens a 32-bit count register into a monotonic 64-bit counter
///
/// Accumulates `count - last_count` on every read. The register must be
/// read at least once per half its range (2^31 ticks) or time is lost;
/// comparator writes are clamped to that horizon so the timer interrupt
/// itself keeps the widening alive.
///
/// A compare register only matches on equality, so a deadline that is due
/// (or already past) is programmed `min_lead` ticks ahead of the last read.
/// `min_lead` must exceed the ticks that elapse between that read and the
/// register write, or the match is missed until the register wraps.
pub struct WideCounter<R> {
    reg: R,
    /// 64-bit time as of `last_count`
    base: u64,
    /// Register value at the last read
    last_count: u32,
    /// Closest a comparator may be programmed to the last read
    min_lead: u32,
}

/// Furthest a comparator may be programmed ahead of the last read
const COMPARE_HORIZON: u64 = (u32::MAX / 2) as u64;

/// Default minimum comparator lead (ticks)
pub const DEFAULT_MIN_LEAD: u32 = 16;

impl<R: CountRegister> WideCounter<R> {
    pub fn new(mut reg: R) -> Self {
        let last_count = reg.read_count();
        Self {
            reg,
            base: 0,
            last_count,
            min_lead: DEFAULT_MIN_LEAD,
        }
    }

    /// Override the minimum comparator lead (at least 1 tick)
    pub fn with_min_lead(mut self, ticks: u32) -> Self {
        self.min_lead = ticks.max(1);
        self
    }

    pub fn min_lead(&self) -> u32 {
        self.min_lead
    }

    /// Rebase the 64-bit time
    pub fn set_time(&mut self, time: u64) {
        self.last_count = self.reg.read_count();
        self.base = time;
    }

    /// 64-bit time without touching the comparator
    pub fn time(&mut self) -> u64 {
        let count = self.reg.read_count();
        self.base = self.base.wrapping_add(count.wrapping_sub(self.last_count) as u64);
        self.last_count = count;
        self.base
    }

    pub fn register(&self) -> &R {
        &self.reg
    }

    pub fn register_mut(&mut self) -> &mut R {
        &mut self.reg
    }
}

impl<R: CountRegister> ClockSource for WideCounter<R> {
    fn read_counter(&mut self) -> u64 {
        self.time()
    }

    fn write_comparator(&mut self, value: u64) {
        let min_lead = self.min_lead as u64;
        let ahead = value.wrapping_sub(self.base);
        // Past values wrap to more than half the range.
        let ahead = if ahead > u64::MAX / 2 {
            min_lead
        } else {
            ahead.clamp(min_lead, COMPARE_HORIZON)
        };
        self.reg
            .write_compare(self.last_count.wrapping_add(ahead as u32));
    }

    fn disarm(&mut self) {
        self.reg.disable_compare();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeCount {
        count: u32,
        compare: Option<u32>,
    }

    impl CountRegister for FakeCount {
        fn read_count(&mut self) -> u32 {
            self.count
        }
        fn write_compare(&mut self, value: u32) {
            self.compare = Some(value);
        }
        fn disable_compare(&mut self) {
            self.compare = None;
        }
    }

    #[test]
    fn test_software_clock() {
        let mut clock = SoftClock::software();
        assert_eq!(clock.read_counter(), 0);
        clock.advance(1000);
        assert_eq!(clock.now(), 1000);
        assert_eq!(clock.us_from_ticks(1000), 1000);
    }

    #[test]
    fn test_clock_rate() {
        let clock = SoftClock::new(46_875_000 * 2);
        assert_eq!(clock.ticks_per_us(), 93);
        assert_eq!(clock.ticks_from_us(10), 930);
    }

    #[test]
    fn test_comparator_latches_once() {
        let mut clock = SoftClock::software();
        clock.write_comparator(50);
        assert_eq!(clock.ticks_until_match(), Some(50));
        clock.advance(49);
        assert!(!clock.take_pending());
        clock.advance(1);
        assert!(clock.take_pending());
        assert!(!clock.is_armed());
        clock.advance(100);
        assert!(!clock.take_pending());
    }

    #[test]
    fn test_comparator_at_now_is_immediate() {
        let mut clock = SoftClock::starting_at(77);
        clock.write_comparator(77);
        assert!(clock.take_pending());
    }

    #[test]
    fn test_disarm() {
        let mut clock = SoftClock::software();
        clock.write_comparator(10);
        clock.disarm();
        clock.advance(20);
        assert!(!clock.take_pending());
    }

    #[test]
    fn test_counter_wraparound() {
        let mut clock = SoftClock::starting_at(u64::MAX - 4);
        let before = clock.read_counter();
        clock.write_comparator(before.wrapping_add(10));
        clock.advance(8);
        assert_eq!(clock.wraps(), 1);
        assert_eq!(clock.now(), 3);
        assert_eq!(clock.now().wrapping_sub(before), 8);
        assert_eq!(clock.ticks_until_match(), Some(2));
    }

    #[test]
    fn test_wide_counter_accumulates_across_register_wrap() {
        let mut wide = WideCounter::new(FakeCount {
            count: u32::MAX - 9,
            compare: None,
        });
        assert_eq!(wide.time(), 0);
        wide.register_mut().count = 5; // wrapped: +15
        assert_eq!(wide.read_counter(), 15);
        wide.register_mut().count = 105;
        assert_eq!(wide.read_counter(), 115);
    }

    #[test]
    fn test_wide_counter_set_time() {
        let mut wide = WideCounter::new(FakeCount::default());
        wide.register_mut().count = 500;
        wide.set_time(1 << 40);
        wide.register_mut().count = 600;
        assert_eq!(wide.time(), (1 << 40) + 100);
    }

    #[test]
    fn test_wide_comparator_truncates_to_register() {
        let mut wide = WideCounter::new(FakeCount::default());
        wide.register_mut().count = u32::MAX - 1;
        wide.set_time(10_000_000_000);
        let now = wide.read_counter();
        wide.write_comparator(now + 20);
        assert_eq!(wide.register().compare, Some(18));
    }

    #[test]
    fn test_wide_comparator_due_now_keeps_min_lead() {
        let mut wide = WideCounter::new(FakeCount::default());
        wide.register_mut().count = 1000;
        let now = wide.read_counter();
        wide.write_comparator(now);
        assert_eq!(wide.register().compare, Some(1000 + DEFAULT_MIN_LEAD));

        wide.write_comparator(now - 50);
        assert_eq!(wide.register().compare, Some(1000 + DEFAULT_MIN_LEAD));

        let mut wide = wide.with_min_lead(0);
        assert_eq!(wide.min_lead(), 1);
        wide.write_comparator(now + 3);
        assert_eq!(wide.register().compare, Some(1003));
    }

    #[test]
    fn test_zero_delta_insert_on_wide_counter() {
        use crate::node::{Target, TimerId};
        use crate::queue::TimerQueue;

        let mut q: TimerQueue<_, crate::mailbox::Mailbox<4>, 4> =
            TimerQueue::new(WideCounter::new(FakeCount::default()), crate::mailbox::Mailbox::new());
        q.init();
        q.clock_mut().register_mut().count = 500;
        q.insert(TimerId(0), 0, 0, Target::new((), 1));
        assert_eq!(q.clock().register().compare, Some(500 + DEFAULT_MIN_LEAD));

        q.clock_mut().register_mut().count = 500 + DEFAULT_MIN_LEAD;
        assert_eq!(q.tick(), 1);
        assert_eq!(q.deliver().recv(), Some(1));
        assert_eq!(q.clock().register().compare, None);
    }

    #[test]
    fn test_wide_comparator_clamped_to_horizon() {
        let mut wide = WideCounter::new(FakeCount::default());
        let now = wide.read_counter();
        wide.write_comparator(now + (1 << 40));
        assert_eq!(wide.register().compare, Some(u32::MAX / 2));
        wide.disarm();
        assert_eq!(wide.register().compare, None);
    }
}
