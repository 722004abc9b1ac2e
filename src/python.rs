//! PyO3 Python bindings — simulated timer queue for scripted scenarios
//!
//! ```python
//! from alice_timerq import TimerQueue
//! q = TimerQueue()
//! q.insert(0, 100, 0, 0xA)
//! q.insert(1, 30, 0, 0xB)
//! q.advance(100)
//! assert q.drain() == [0xB, 0xA]
//! ```
//!
//! Author: Moroya Sakamoto

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::clock::SoftClock;
use crate::mailbox::Mailbox;
use crate::node::{Target, TimerId};
use crate::sim::Simulator;

const PY_SLOTS: usize = 64;
const PY_MAILBOX: usize = 1024;

/// Timer queue driven by a software counter
#[pyclass(name = "TimerQueue")]
pub struct PyTimerQueue {
    sim: Simulator<Mailbox<PY_MAILBOX>, PY_SLOTS>,
}

#[pymethods]
impl PyTimerQueue {
    #[new]
    #[pyo3(signature = (start=0))]
    fn new(start: u64) -> Self {
        Self {
            sim: Simulator::new(SoftClock::starting_at(start), Mailbox::new()),
        }
    }

    /// Queue `slot` to fire after `delta` ticks, then every `reload`
    fn insert(&mut self, slot: u16, delta: u64, reload: u64, payload: u32) -> PyResult<()> {
        self.sim
            .queue
            .try_insert(TimerId(slot), delta, reload, Target::new((), payload))
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn remove(&mut self, slot: u16) -> bool {
        self.sim.queue.remove(TimerId(slot))
    }

    /// Advance the counter, servicing comparator matches; returns fires
    fn advance(&mut self, ticks: u64) -> usize {
        self.sim.advance(ticks)
    }

    /// Service the queue now (spurious interrupt)
    fn tick(&mut self) -> usize {
        self.sim.queue.tick()
    }

    fn now(&self) -> u64 {
        self.sim.now()
    }

    fn peek_next_deadline(&self) -> Option<u64> {
        self.sim.queue.peek_next_deadline()
    }

    /// `(slot, stored delta)` in queue order
    fn order(&self) -> Vec<(u16, u64)> {
        self.sim.queue.iter().map(|(id, delta)| (id.0, delta)).collect()
    }

    /// Pop every delivered payload
    fn drain(&mut self) -> Vec<u32> {
        let mailbox = self.sim.queue.deliver();
        core::iter::from_fn(|| mailbox.recv()).collect()
    }

    fn __len__(&self) -> usize {
        self.sim.queue.len()
    }
}

#[pymodule]
fn alice_timerq(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTimerQueue>()?;
    Ok(())
}
