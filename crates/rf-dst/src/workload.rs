//! Workload seam.
//!
//! A scenario only says which resource each step touches and how. A
//! `Workload` gives the steps a body, for example a shared counter that
//! reads and writes really happen to, so a lost update can be checked as an
//! invariant after the trial.

use rf_core::{Step, WorkerId};

/// Behaviour attached to scenario steps.
///
/// Implementations use interior mutability; the scheduler only holds a
/// shared reference. `reset` is called before every trial.
pub trait Workload: Send + Sync {
    /// Restore the initial state.
    fn reset(&self) {}

    /// Run the body of one granted step.
    ///
    /// An `Err` aborts the current trial only.
    fn execute(&self, worker: WorkerId, step_index: usize, step: &Step) -> Result<(), String>;

    /// Check state after a trial ran to completion.
    fn check_invariants(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Workload with no step bodies; only the access trace matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceOnly;

impl Workload for TraceOnly {
    fn execute(&self, _worker: WorkerId, _step_index: usize, _step: &Step) -> Result<(), String> {
        Ok(())
    }
}
