//! Two-phase scalar aggregation
//!
//! Phase one: every worker publishes its partial into its own slot. Phase
//! two: after all slots are filled, each worker reads the reduced total.
//! Waits are bounded so a lost worker surfaces as an error instead of a hang.

use std::ops::Add;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{ExecError, ExecResult};

struct Slots<T> {
    values: Vec<Option<T>>,
    arrived: usize,
}

/// Barrier that sums one partial per worker.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tessel_exec::ScalarBarrier;
///
/// let barrier = ScalarBarrier::new(2, Duration::from_secs(1));
/// barrier.publish(1, 5u64).unwrap();
/// barrier.publish(0, 7u64).unwrap();
/// assert_eq!(barrier.wait().unwrap(), 12);
/// ```
pub struct ScalarBarrier<T> {
    parties: usize,
    timeout: Duration,
    slots: Mutex<Slots<T>>,
    ready: Condvar,
}

impl<T> ScalarBarrier<T>
where
    T: Copy + Default + Add<Output = T>,
{
    pub fn new(parties: usize, timeout: Duration) -> Self {
        Self {
            parties,
            timeout,
            slots: Mutex::new(Slots {
                values: vec![None; parties],
                arrived: 0,
            }),
            ready: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Publish the partial of `slot`. Each slot publishes exactly once.
    pub fn publish(&self, slot: usize, partial: T) -> ExecResult<()> {
        let mut slots = self.slots.lock();
        let entry = slots
            .values
            .get_mut(slot)
            .filter(|entry| entry.is_none())
            .ok_or(ExecError::BarrierSlot {
                slot,
                parties: self.parties,
            })?;
        *entry = Some(partial);
        slots.arrived += 1;
        if slots.arrived == self.parties {
            self.ready.notify_all();
        }
        Ok(())
    }

    /// Wait for every slot and return the sum, reduced in slot order.
    pub fn wait(&self) -> ExecResult<T> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut slots = self.slots.lock();
        while slots.arrived < self.parties {
            if self.ready.wait_until(&mut slots, deadline).timed_out()
                && slots.arrived < self.parties
            {
                return Err(ExecError::BarrierTimeout {
                    arrived: slots.arrived,
                    parties: self.parties,
                    waited: started.elapsed(),
                });
            }
        }
        Ok(slots
            .values
            .iter()
            .fold(T::default(), |acc, v| acc + v.unwrap_or_default()))
    }
}
