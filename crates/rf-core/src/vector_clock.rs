//! Vector clocks for the happens-before relation between workers.
//!
//! Given events e1 and e2:
//! - e1 happens-before e2 if VC(e1) < VC(e2)
//! - e1 and e2 are concurrent if neither happens-before the other
//!
//! Clocks grow on demand, so the number of workers need not be known up
//! front. Missing entries read as zero.

use std::fmt;

use crate::types::WorkerId;

#[derive(Clone, Default, PartialEq, Eq)]
pub struct VectorClock {
    clocks: Vec<u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self { clocks: Vec::new() }
    }

    /// Advance `worker`'s own component.
    pub fn tick(&mut self, worker: WorkerId) {
        let idx = worker.index();
        if idx >= self.clocks.len() {
            self.clocks.resize(idx + 1, 0);
        }
        self.clocks[idx] = self.clocks[idx].saturating_add(1);
    }

    /// Element-wise max with `other`.
    pub fn merge(&mut self, other: &VectorClock) {
        if other.clocks.len() > self.clocks.len() {
            self.clocks.resize(other.clocks.len(), 0);
        }
        for (mine, theirs) in self.clocks.iter_mut().zip(&other.clocks) {
            *mine = (*mine).max(*theirs);
        }
    }

    #[inline]
    pub fn get(&self, worker: WorkerId) -> u64 {
        self.clocks.get(worker.index()).copied().unwrap_or(0)
    }

    /// VC1 < VC2 iff every component is <= and at least one is <.
    pub fn happens_before(&self, other: &VectorClock) -> bool {
        let len = self.clocks.len().max(other.clocks.len());
        let mut some_strictly_less = false;

        for i in 0..len {
            let a = self.clocks.get(i).copied().unwrap_or(0);
            let b = other.clocks.get(i).copied().unwrap_or(0);
            if a > b {
                return false;
            }
            if a < b {
                some_strictly_less = true;
            }
        }

        some_strictly_less
    }

    #[inline]
    pub fn concurrent(&self, other: &VectorClock) -> bool {
        !self.happens_before(other) && !other.happens_before(self)
    }
}

impl fmt::Debug for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VC{:?}", self.clocks)
    }
}
