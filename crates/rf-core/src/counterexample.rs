//! Counterexample representation and rendering.
//!
//! When a trial produces violations, a counterexample shows the exact
//! interleaving of accesses that led to them, one column per worker.

use std::fmt::Write as _;

use crate::types::{AccessEvent, AccessStatus, ResourceId, WorkerId};
use crate::violation::Violation;

/// The failure path of one trial.
#[derive(Debug, Clone, Default)]
pub struct Counterexample {
    /// Seed that reproduces the trial.
    pub seed: Option<u64>,
    /// Recorded accesses in execution order.
    pub interleaving: Vec<AccessEvent>,
    /// Findings for this trial.
    pub violations: Vec<Violation>,
    /// Resource names indexed by `ResourceId`, for labels.
    pub resource_names: Vec<String>,
    /// Free-form note (termination reason, workload error, ...).
    pub description: Option<String>,
}

/// Column width for worker cells.
const CELL_WIDTH: usize = 22;

impl Counterexample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_resource_names(mut self, names: Vec<String>) -> Self {
        self.resource_names = names;
        self
    }

    pub fn with_trace(mut self, trace: &[AccessEvent]) -> Self {
        self.interleaving = trace.to_vec();
        self
    }

    pub fn with_violations(mut self, violations: &[Violation]) -> Self {
        self.violations = violations.to_vec();
        self
    }

    fn resource_label(&self, resource: ResourceId) -> String {
        self.resource_names
            .get(resource.index())
            .cloned()
            .unwrap_or_else(|| resource.to_string())
    }

    /// Render as a thread diagram.
    ///
    /// ```text
    /// Seed: 12345
    ///
    /// Step | Tick | W0                   | W1                   |
    /// -----|------|----------------------|----------------------|
    ///    1 |    3 | read(balance)        |                      |
    ///    2 |    4 |                      | read(balance)        |
    ///    3 |    6 | write(balance)       |                      |
    /// ```
    pub fn render_diagram(&self) -> String {
        let mut output = String::new();

        if let Some(seed) = self.seed {
            let _ = writeln!(output, "Seed: {}\n", seed);
        }

        if let Some(ref desc) = self.description {
            let _ = writeln!(output, "Failure: {}\n", desc);
        }

        let mut workers: Vec<WorkerId> = self.interleaving.iter().map(|e| e.worker).collect();
        workers.sort_unstable();
        workers.dedup();

        if workers.is_empty() {
            output.push_str("(no accesses recorded)\n");
        } else {
            output.push_str("Step | Tick |");
            for worker in &workers {
                let _ = write!(output, " {:<1$} |", worker.to_string(), CELL_WIDTH);
            }
            output.push('\n');

            output.push_str("-----|------|");
            for _ in &workers {
                let _ = write!(output, "{}|", "-".repeat(CELL_WIDTH + 2));
            }
            output.push('\n');

            for event in &self.interleaving {
                let _ = write!(output, "{:4} | {:4} |", event.seq + 1, event.timestamp);
                for worker in &workers {
                    if *worker == event.worker {
                        let mut cell =
                            format!("{}({})", event.op, self.resource_label(event.resource));
                        if event.status == AccessStatus::Blocked {
                            cell.push_str(" [WAIT]");
                        }
                        let _ = write!(output, " {:<1$} |", cell, CELL_WIDTH);
                    } else {
                        let _ = write!(output, " {:<1$} |", "", CELL_WIDTH);
                    }
                }
                output.push('\n');
            }
        }

        if !self.violations.is_empty() {
            output.push_str("\nViolations:\n");
            for violation in &self.violations {
                let _ = writeln!(output, "  - {}", self.describe(violation));
            }
        }

        output
    }

    /// Violation text with resource names substituted for ids.
    fn describe(&self, violation: &Violation) -> String {
        match violation {
            Violation::Race(race) => {
                let steps: Vec<String> = race.events.iter().map(|e| (e.seq + 1).to_string()).collect();
                format!(
                    "Data race on {} between {} and {} (steps {})",
                    self.resource_label(race.resource),
                    race.worker_a,
                    race.worker_b,
                    steps.join(", ")
                )
            }
            Violation::Deadlock(deadlock) => {
                let links: Vec<String> = deadlock
                    .workers
                    .iter()
                    .zip(&deadlock.resources)
                    .map(|(w, r)| format!("{} waits on {}", w, self.resource_label(*r)))
                    .collect();
                format!("Deadlock ({}): {}", deadlock.cause.as_str(), links.join(", "))
            }
            Violation::Invariant(_) => violation.to_string(),
        }
    }
}
