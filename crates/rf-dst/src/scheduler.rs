//! Seeded interleaving scheduler.
//!
//! Workers are simulated cooperatively on the calling thread as a
//! discrete-event loop over logical ticks. Everything that varies between
//! trials (start offsets, per-step delays, tie-break priorities) is drawn up
//! front from the trial seed, so one seed always produces one trace.
//!
//! A worker can only be preempted at a step boundary or by a blocking
//! acquire. Blocked workers park until the holder releases, then retry at
//! the release tick.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use rf_core::{
    AccessStatus, Counterexample, OpKind, ResourceId, ScenarioSpec, Stamp, Tick, Trace,
    Violation, WorkerId,
};

use crate::error::TrialError;
use crate::random::DeterministicRng;
use crate::registry::ResourceRegistry;
use crate::workload::Workload;

/// Timing and budget knobs for one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Scheduling decisions allowed before the trial is cut off.
    pub max_steps: u64,
    /// Upper bound (inclusive) for a worker's start tick.
    pub max_start_offset: Tick,
    /// Upper bound (inclusive) for the extra delay after each step.
    pub max_delay: Tick,
    /// Ticks a granted step takes before the worker is ready again.
    pub step_ticks: Tick,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            max_start_offset: 8,
            max_delay: 8,
            step_ticks: 1,
        }
    }
}

/// Seed-derived timing of one trial. Indexed by position in the worker list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub start_offsets: Vec<Tick>,
    /// `delays[w][i]` is added after worker `w` completes step `i`.
    pub delays: Vec<Vec<Tick>>,
    /// Lower value runs first when workers are ready at the same tick.
    pub priorities: Vec<u32>,
}

impl Schedule {
    /// Draw a schedule for workers with the given step counts.
    ///
    /// Draw order is fixed: all start offsets, then each worker's delays,
    /// then the priority permutation.
    pub fn derive(seed: u64, step_counts: &[usize], config: &SchedulerConfig) -> Self {
        let mut rng = DeterministicRng::new(seed);

        let start_offsets = step_counts
            .iter()
            .map(|_| rng.gen_range(0..=config.max_start_offset))
            .collect();

        let delays = step_counts
            .iter()
            .map(|&count| {
                (0..count)
                    .map(|_| rng.gen_range(0..=config.max_delay))
                    .collect()
            })
            .collect();

        let mut priorities: Vec<u32> = (0..step_counts.len() as u32).collect();
        rng.shuffle(&mut priorities);

        Self {
            start_offsets,
            delays,
            priorities,
        }
    }
}

/// How a trial's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    /// Every worker ran all of its steps.
    Completed,
    /// No worker could run while some were still parked on a lock.
    Stalled,
    /// `max_steps` scheduling decisions were used up.
    StepBudgetExceeded,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Termination::Completed => "completed",
            Termination::Stalled => "stalled",
            Termination::StepBudgetExceeded => "step-budget-exceeded",
        }
    }
}

/// Summary of a trial's findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrialOutcome {
    Clean,
    RaceDetected,
    DeadlockDetected,
    RaceAndDeadlockDetected,
    InvariantViolated,
}

impl TrialOutcome {
    pub fn from_violations(violations: &[Violation]) -> Self {
        let race = violations.iter().any(Violation::is_race);
        let deadlock = violations.iter().any(Violation::is_deadlock);
        match (race, deadlock) {
            (true, true) => TrialOutcome::RaceAndDeadlockDetected,
            (true, false) => TrialOutcome::RaceDetected,
            (false, true) => TrialOutcome::DeadlockDetected,
            (false, false) if violations.is_empty() => TrialOutcome::Clean,
            (false, false) => TrialOutcome::InvariantViolated,
        }
    }
}

/// A worker that had not finished when the trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStep {
    pub worker: WorkerId,
    /// Resource of the step the worker was about to run.
    pub resource: ResourceId,
    /// Whether the worker was parked on `resource`.
    pub parked: bool,
}

/// One executed trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trial {
    pub seed: u64,
    pub schedule: Schedule,
    pub trace: Trace,
    pub termination: Termination,
    pub steps_taken: u64,
    pub pending: Vec<PendingStep>,
    pub violations: Vec<Violation>,
    pub outcome: TrialOutcome,
}

impl Trial {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Attach findings and derive the outcome from them.
    pub fn set_violations(&mut self, violations: Vec<Violation>) {
        self.outcome = TrialOutcome::from_violations(&violations);
        self.violations = violations;
    }

    /// Counterexample for this trial, labelled with `resource_names`.
    pub fn counterexample(&self, resource_names: Vec<String>) -> Counterexample {
        let mut ce = Counterexample::with_seed(self.seed)
            .with_resource_names(resource_names)
            .with_trace(&self.trace)
            .with_violations(&self.violations);
        if self.termination != Termination::Completed {
            ce = ce.with_description(format!(
                "trial {} after {} steps",
                self.termination.as_str(),
                self.steps_taken
            ));
        }
        ce
    }
}

#[derive(Debug, Clone, Copy)]
struct WorkerState {
    pc: usize,
    ready_at: Tick,
    parked_on: Option<ResourceId>,
}

/// Runs scenarios under seed-derived interleavings.
#[derive(Debug, Clone, Default)]
pub struct InterleavingScheduler {
    config: SchedulerConfig,
}

impl InterleavingScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one trial.
    ///
    /// The registry and workload are reset first. The returned trial has
    /// no findings yet; see `ViolationDetector::analyze`.
    pub fn run_trial(
        &self,
        registry: &ResourceRegistry,
        workers: &[(Arc<ScenarioSpec>, WorkerId)],
        workload: &dyn Workload,
        seed: u64,
    ) -> Result<Trial, TrialError> {
        validate_workers(registry, workers)?;

        registry.reset();
        workload.reset();

        let step_counts: Vec<usize> = workers.iter().map(|(spec, _)| spec.steps.len()).collect();
        let schedule = Schedule::derive(seed, &step_counts, &self.config);

        let mut states: Vec<WorkerState> = schedule
            .start_offsets
            .iter()
            .map(|&ready_at| WorkerState {
                pc: 0,
                ready_at,
                parked_on: None,
            })
            .collect();

        let mut now: Tick = 0;
        let mut steps_taken: u64 = 0;

        let termination = loop {
            let next = states
                .iter()
                .enumerate()
                .filter(|(i, s)| s.parked_on.is_none() && s.pc < step_counts[*i])
                .min_by_key(|(i, s)| (s.ready_at, schedule.priorities[*i]))
                .map(|(i, _)| i);

            let Some(idx) = next else {
                if states.iter().any(|s| s.parked_on.is_some()) {
                    break Termination::Stalled;
                }
                break Termination::Completed;
            };

            if steps_taken >= self.config.max_steps {
                break Termination::StepBudgetExceeded;
            }
            steps_taken += 1;

            let (spec, worker) = &workers[idx];
            let pc = states[idx].pc;
            let step = spec.steps[pc];
            let delay = schedule.delays[idx][pc];
            now = now.max(states[idx].ready_at);

            let event = registry.record_access(
                step.resource,
                *worker,
                step.op,
                Stamp {
                    timestamp: now,
                    delay,
                },
            )?;

            if event.status == AccessStatus::Blocked {
                trace!(seed, %worker, resource = %step.resource, tick = now, "parked");
                states[idx].parked_on = Some(step.resource);
                continue;
            }

            workload
                .execute(*worker, pc, &step)
                .map_err(|message| TrialError::Workload {
                    worker: *worker,
                    step: pc,
                    message,
                })?;

            let state = &mut states[idx];
            state.pc += 1;
            state.ready_at = now + self.config.step_ticks + delay;

            if step.op == OpKind::Release {
                for other in states.iter_mut() {
                    if other.parked_on == Some(step.resource) {
                        other.parked_on = None;
                        other.ready_at = now;
                    }
                }
            }
        };

        let pending = states
            .iter()
            .zip(workers)
            .filter(|(s, (spec, _))| s.pc < spec.steps.len())
            .map(|(s, (spec, worker))| PendingStep {
                worker: *worker,
                resource: spec.steps[s.pc].resource,
                parked: s.parked_on.is_some(),
            })
            .collect();

        Ok(Trial {
            seed,
            schedule,
            trace: registry.trace(),
            termination,
            steps_taken,
            pending,
            violations: Vec::new(),
            outcome: TrialOutcome::Clean,
        })
    }
}

fn validate_workers(
    registry: &ResourceRegistry,
    workers: &[(Arc<ScenarioSpec>, WorkerId)],
) -> Result<(), TrialError> {
    let resource_count = registry.len();
    let mut seen = HashSet::new();

    for (spec, worker) in workers {
        if !seen.insert(*worker) {
            return Err(TrialError::Scenario {
                scenario: spec.name.clone(),
                reason: format!("worker id {} is assigned twice", worker),
            });
        }
        if let Some(step) = spec
            .steps
            .iter()
            .find(|s| s.resource.index() >= resource_count)
        {
            return Err(TrialError::Scenario {
                scenario: spec.name.clone(),
                reason: format!("step references unregistered resource {}", step.resource),
            });
        }
    }
    Ok(())
}
