//! Findings produced by the detector.
//!
//! Violations are the normal output of a fuzz campaign, not errors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{AccessEvent, ResourceId, WorkerId};

/// Unsynchronized conflicting accesses to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceViolation {
    pub resource: ResourceId,
    pub worker_a: WorkerId,
    pub worker_b: WorkerId,
    /// First conflicting pair, in trace order.
    pub events: Vec<AccessEvent>,
}

/// Why a deadlock was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeadlockCause {
    /// Cycle in the wait-for graph at the end of the trace.
    WaitCycle,
    /// Resources acquired in conflicting orders by different workers.
    LockOrderInversion,
    /// No worker could run while some were parked on held resources.
    Stalled,
    /// The trial hit its step budget and was terminated.
    StepBudget,
}

impl DeadlockCause {
    pub fn as_str(self) -> &'static str {
        match self {
            DeadlockCause::WaitCycle => "wait-cycle",
            DeadlockCause::LockOrderInversion => "lock-order-inversion",
            DeadlockCause::Stalled => "stalled",
            DeadlockCause::StepBudget => "step-budget",
        }
    }
}

/// A (potential) circular wait.
///
/// For a wait cycle, `workers[i]` waits for `resources[i]`, which is held by
/// `workers[i + 1]` (wrapping). For a lock-order inversion, `workers[i]`
/// acquired `resources[i + 1]` while holding `resources[i]`. For stalls and
/// step-budget terminations the vectors list the parked workers and what
/// they wait for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockViolation {
    pub cause: DeadlockCause,
    pub workers: Vec<WorkerId>,
    pub resources: Vec<ResourceId>,
}

/// A workload invariant that failed after a trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub message: String,
}

/// Kind tag used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    Race,
    Deadlock,
    Invariant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Violation {
    Race(RaceViolation),
    Deadlock(DeadlockViolation),
    Invariant(InvariantViolation),
}

impl Violation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::Race(_) => ViolationKind::Race,
            Violation::Deadlock(_) => ViolationKind::Deadlock,
            Violation::Invariant(_) => ViolationKind::Invariant,
        }
    }

    /// Workers named by the finding, sorted and deduplicated.
    pub fn involved_workers(&self) -> Vec<WorkerId> {
        let mut workers = match self {
            Violation::Race(race) => vec![race.worker_a, race.worker_b],
            Violation::Deadlock(deadlock) => deadlock.workers.clone(),
            Violation::Invariant(_) => Vec::new(),
        };
        workers.sort_unstable();
        workers.dedup();
        workers
    }

    pub fn is_race(&self) -> bool {
        matches!(self, Violation::Race(_))
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self, Violation::Deadlock(_))
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Race(race) => write!(
                f,
                "Data race on {} between {} and {}",
                race.resource, race.worker_a, race.worker_b
            ),
            Violation::Deadlock(deadlock) => {
                write!(f, "Deadlock ({}):", deadlock.cause.as_str())?;
                for (worker, resource) in deadlock.workers.iter().zip(&deadlock.resources) {
                    write!(f, " {}->{}", worker, resource)?;
                }
                Ok(())
            }
            Violation::Invariant(inv) => write!(f, "Invariant failed: {}", inv.message),
        }
    }
}
