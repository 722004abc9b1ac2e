//! Property tests — delta list against an absolute-deadline model
//!
//! Author: Moroya Sakamoto

use crate::clock::SoftClock;
use crate::mailbox::{Deliver, Payload};
use crate::node::{Target, TimerId};
use crate::sim::Simulator;
use proptest::prelude::*;

const SLOTS: usize = 8;

/// Records `(slot, deadline)`; the payload carries the absolute deadline.
#[derive(Default)]
struct Fires(Vec<(u16, Payload)>);

impl Deliver for Fires {
    type Handle = u16;

    fn notify(&mut self, handle: u16, payload: Payload) {
        self.0.push((handle, payload));
    }
}

#[derive(Debug, Clone)]
enum Op {
    Insert { slot: u16, delta: u64 },
    Remove { slot: u16 },
    Advance { ticks: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u16..SLOTS as u16, 0u64..500).prop_map(|(slot, delta)| Op::Insert { slot, delta }),
        1 => (0u16..SLOTS as u16).prop_map(|slot| Op::Remove { slot }),
        2 => (0u64..300).prop_map(|ticks| Op::Advance { ticks }),
    ]
}

proptest! {
    #[test]
    fn one_shots_match_absolute_deadline_model(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let mut sim = Simulator::<_, SLOTS>::testing(Fires::default());
        let mut model: [Option<u64>; SLOTS] = [None; SLOTS];
        let mut seen = 0;

        for op in ops {
            match op {
                Op::Insert { slot, delta } => {
                    if model[slot as usize].is_none() {
                        let deadline = sim.now() + delta;
                        sim.queue.insert(TimerId(slot), delta, 0, Target::new(slot, deadline as Payload));
                        model[slot as usize] = Some(deadline);
                    }
                }
                Op::Remove { slot } => {
                    let was_queued = model[slot as usize].take().is_some();
                    prop_assert_eq!(sim.queue.remove(TimerId(slot)), was_queued);
                }
                Op::Advance { ticks } => {
                    sim.advance(ticks);
                }
            }

            // Fires since the last op: never early, never missed, in deadline order.
            let fires = &sim.queue.deliver().0[seen..];
            let mut last = 0;
            for &(slot, deadline) in fires {
                let deadline = deadline as u64;
                prop_assert!(deadline <= sim.now());
                prop_assert!(deadline >= last);
                prop_assert_eq!(model[slot as usize], Some(deadline));
                model[slot as usize] = None;
                last = deadline;
            }
            seen = sim.queue.deliver().0.len();

            // Prefix sums reproduce every outstanding deadline.
            for (slot, deadline) in model.iter().enumerate() {
                let id = TimerId(slot as u16);
                match deadline {
                    Some(deadline) => {
                        prop_assert!(*deadline >= sim.now());
                        let remaining = sim.queue.remaining(id);
                        prop_assert_eq!(
                            remaining.map(|r| sim.queue.last_service_time() + r),
                            Some(*deadline)
                        );
                    }
                    None => prop_assert!(!sim.queue.is_queued(id)),
                }
            }
        }
    }

    #[test]
    fn periodic_timer_fires_every_reload(
        delta in 1u64..100,
        reload in 1u64..100,
        chunks in prop::collection::vec(0u64..250, 1..20),
    ) {
        let mut sim = Simulator::<_, SLOTS>::testing(Fires::default());
        sim.queue.insert(TimerId(0), delta, reload, Target::new(0, 0));

        let mut total = 0;
        let mut fired = 0;
        for chunk in chunks {
            fired += sim.advance(chunk) as u64;
            total += chunk;
        }

        let expected = if total >= delta { (total - delta) / reload + 1 } else { 0 };
        let next = delta + expected * reload;
        prop_assert_eq!(fired, expected);
        prop_assert!(next > total);
        prop_assert_eq!(
            sim.queue.remaining(TimerId(0)).map(|r| sim.queue.last_service_time() + r),
            Some(next)
        );
    }

    #[test]
    fn coarse_tick_matches_fine_ticks(delta in 0u64..50, reload in 8u64..20, span in 0u64..400) {
        let mut coarse = Simulator::<_, SLOTS>::testing(Fires::default());
        coarse.queue.insert(TimerId(1), delta, reload, Target::new(1, 0));
        coarse.queue.clock_mut().advance(span);
        let coarse_fired = coarse.queue.tick();

        let mut fine = Simulator::<_, SLOTS>::testing(Fires::default());
        fine.queue.insert(TimerId(1), delta, reload, Target::new(1, 0));
        let fine_fired = fine.advance(span);

        let deadline = |sim: &Simulator<Fires, SLOTS>| {
            sim.queue.remaining(TimerId(1)).map(|r| sim.queue.last_service_time() + r)
        };
        prop_assert_eq!(coarse_fired, fine_fired);
        prop_assert_eq!(deadline(&coarse), deadline(&fine));
    }

    #[test]
    fn wraparound_fires_at_relative_time(back in 0u64..1000, delta in 1u64..2000) {
        let start = u64::MAX - back;
        let mut sim = Simulator::<_, SLOTS>::new(SoftClock::starting_at(start), Fires::default());
        sim.queue.insert(TimerId(0), delta, 0, Target::new(0, 0));

        prop_assert_eq!(sim.advance(delta - 1), 0);
        prop_assert!(sim.queue.is_queued(TimerId(0)));
        prop_assert_eq!(sim.advance(1), 1);
        prop_assert_eq!(sim.now(), start.wrapping_add(delta));
    }
}
