//! Fuzz campaigns.
//!
//! A campaign runs the same set of scenarios under many seeds and collects
//! every trial that produced a finding, together with the seed that
//! reproduces it. Setup problems (unknown resources, malformed scenarios,
//! bad configuration) are reported before the first trial runs.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use rf_core::{
    Counterexample, DeadlockCause, DeadlockViolation, InvariantViolation, OpKind, ScenarioDef,
    ScenarioSpec, Step, Tick, Trace, Violation, ViolationDetector, ViolationKind, WorkerId,
};

use crate::error::{ConfigError, TrialError};
use crate::random::SeedSource;
use crate::registry::ResourceRegistry;
use crate::scheduler::{InterleavingScheduler, SchedulerConfig, Termination, Trial};
use crate::workload::{TraceOnly, Workload};

/// Master seed used when none is configured.
pub const DEFAULT_MASTER_SEED: u64 = 0x5EED_F022;

/// Largest accepted start offset or delay bound.
const TICK_BOUND_MAX: Tick = 1 << 32;

/// Campaign parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Number of trials to run.
    pub trial_count: u64,
    /// Seed for the trial seed stream.
    pub master_seed: u64,
    /// Scheduling decisions allowed per trial.
    pub max_steps: u64,
    /// Upper bound for a worker's start tick.
    pub max_start_offset: Tick,
    /// Upper bound for the delay drawn after each step.
    pub max_delay: Tick,
    /// Ticks one step takes.
    pub step_ticks: Tick,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            trial_count: 1000,
            master_seed: DEFAULT_MASTER_SEED,
            max_steps: 10_000,
            max_start_offset: 8,
            max_delay: 8,
            step_ticks: 1,
        }
    }
}

impl CampaignConfig {
    /// Configuration for stress testing.
    pub fn stress() -> Self {
        Self {
            trial_count: 100_000,
            max_start_offset: 32,
            max_delay: 32,
            ..Self::default()
        }
    }

    /// Configuration for quick testing.
    pub fn quick() -> Self {
        Self {
            trial_count: 100,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, master_seed: u64) -> Self {
        self.master_seed = master_seed;
        self
    }

    pub fn with_trials(mut self, trial_count: u64) -> Self {
        self.trial_count = trial_count;
        self
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_steps: self.max_steps,
            max_start_offset: self.max_start_offset,
            max_delay: self.max_delay,
            step_ticks: self.step_ticks,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_steps must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("max_start_offset", self.max_start_offset),
            ("max_delay", self.max_delay),
            ("step_ticks", self.step_ticks),
        ] {
            if value > TICK_BOUND_MAX {
                return Err(ConfigError::InvalidConfig(format!(
                    "{} must not exceed {}, got {}",
                    name, TICK_BOUND_MAX, value
                )));
            }
        }
        Ok(())
    }
}

/// Campaign description as read from a JSON file.
///
/// ```json
/// {
///   "resources": ["balance", "guard"],
///   "scenarios": [
///     { "name": "deposit", "instances": 2, "steps": [
///       { "resource": "guard", "op": "acquire" },
///       { "resource": "balance", "op": "read" },
///       { "resource": "balance", "op": "write" },
///       { "resource": "guard", "op": "release" }
///     ] }
///   ],
///   "config": { "trial_count": 500 }
/// }
/// ```
///
/// Without `resources`, names are registered in order of first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
    pub scenarios: Vec<ScenarioDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<CampaignConfig>,
}

impl CampaignFile {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json)
            .map_err(|e| ConfigError::InvalidConfig(format!("malformed campaign file: {}", e)))
    }

    /// Builder preloaded with this file's resources, scenarios and config.
    pub fn into_builder(self) -> FuzzCampaignBuilder {
        let mut builder = FuzzCampaign::builder().scenarios(self.scenarios);
        if let Some(resources) = self.resources {
            builder = builder.resources(resources).auto_register(false);
        }
        if let Some(config) = self.config {
            builder = builder.config(config);
        }
        builder
    }
}

/// One finding, with what is needed to reproduce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub seed: u64,
    pub kind: ViolationKind,
    pub involved_workers: Vec<WorkerId>,
    pub detail: Violation,
    pub trace: Trace,
}

/// A trial that aborted with an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialErrorRecord {
    pub seed: u64,
    pub error: String,
}

/// Result of a campaign. Clean trials are only counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub master_seed: u64,
    pub trials_run: u64,
    pub clean_trials: u64,
    pub violations: Vec<ViolationRecord>,
    pub trial_errors: Vec<TrialErrorRecord>,
}

impl CampaignReport {
    pub fn new(master_seed: u64) -> Self {
        Self {
            master_seed,
            ..Self::default()
        }
    }

    /// No findings and no aborted trials.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.trial_errors.is_empty()
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }

    /// Seeds of trials with findings, in the order they ran.
    pub fn violating_seeds(&self) -> Vec<u64> {
        let mut seen = HashSet::new();
        self.violations
            .iter()
            .map(|v| v.seed)
            .filter(|seed| seen.insert(*seed))
            .collect()
    }

    fn record_trial(&mut self, trial: &Trial) {
        for violation in &trial.violations {
            self.violations.push(ViolationRecord {
                seed: trial.seed,
                kind: violation.kind(),
                involved_workers: violation.involved_workers(),
                detail: violation.clone(),
                trace: trial.trace.clone(),
            });
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Format as a one-line summary plus the failing seeds.
    pub fn format(&self) -> String {
        let status = if self.is_clean() { "PASS" } else { "FAIL" };

        let mut result = format!(
            "[{}] master_seed={} trials={} clean={} races={} deadlocks={} invariants={} errors={}",
            status,
            self.master_seed,
            self.trials_run,
            self.clean_trials,
            self.count(ViolationKind::Race),
            self.count(ViolationKind::Deadlock),
            self.count(ViolationKind::Invariant),
            self.trial_errors.len()
        );

        for seed in self.violating_seeds() {
            result.push_str(&format!("\n  Replay: --seed {}", seed));
        }
        for error in &self.trial_errors {
            result.push_str(&format!("\n  Error (seed {}): {}", error.seed, error.error));
        }

        result
    }
}

/// A configured campaign, ready to run.
pub struct FuzzCampaign {
    registry: ResourceRegistry,
    scenarios: Vec<Arc<ScenarioSpec>>,
    workers: Vec<(Arc<ScenarioSpec>, WorkerId)>,
    workload: Arc<dyn Workload>,
    scheduler: InterleavingScheduler,
    detector: ViolationDetector,
    config: CampaignConfig,
    trial_lock: Mutex<()>,
}

impl std::fmt::Debug for FuzzCampaign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuzzCampaign")
            .field("registry", &self.registry)
            .field("scenarios", &self.scenarios)
            .field("workers", &self.workers.len())
            .field("config", &self.config)
            .finish()
    }
}

impl FuzzCampaign {
    pub fn builder() -> FuzzCampaignBuilder {
        FuzzCampaignBuilder::default()
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn scenarios(&self) -> &[Arc<ScenarioSpec>] {
        &self.scenarios
    }

    pub fn workers(&self) -> &[(Arc<ScenarioSpec>, WorkerId)] {
        &self.workers
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Run `config.trial_count` trials from `config.master_seed`.
    pub fn run(&self) -> CampaignReport {
        let mut seeds = SeedSource::new(self.config.master_seed);
        self.run_campaign(self.config.trial_count, &mut seeds)
    }

    /// Run exactly `trial_count` trials with seeds drawn from `seeds`.
    ///
    /// Never stops early: trial errors and findings are recorded and the
    /// next trial starts.
    pub fn run_campaign(&self, trial_count: u64, seeds: &mut SeedSource) -> CampaignReport {
        let mut report = CampaignReport::new(seeds.master_seed());

        info!(
            master_seed = seeds.master_seed(),
            trial_count,
            workers = self.workers.len(),
            resources = self.registry.len(),
            "campaign started"
        );

        for _ in 0..trial_count {
            let seed = seeds.next_seed();
            report.trials_run += 1;

            match self.evaluate(seed) {
                Ok(trial) => {
                    debug!(
                        seed,
                        termination = trial.termination.as_str(),
                        steps = trial.steps_taken,
                        violations = trial.violations.len(),
                        "trial finished"
                    );
                    if trial.is_clean() {
                        report.clean_trials += 1;
                    } else {
                        warn!(seed, outcome = ?trial.outcome, "violation found");
                        report.record_trial(&trial);
                    }
                }
                Err(error) => {
                    warn!(seed, %error, "trial aborted");
                    report.trial_errors.push(TrialErrorRecord {
                        seed,
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            master_seed = report.master_seed,
            trials_run = report.trials_run,
            clean_trials = report.clean_trials,
            violations = report.violations.len(),
            trial_errors = report.trial_errors.len(),
            "campaign finished"
        );
        report
    }

    /// Re-run the trial for `seed`, findings included.
    pub fn replay(&self, seed: u64) -> Result<Trial, TrialError> {
        self.evaluate(seed)
    }

    /// Counterexample for a trial of this campaign, with resource names.
    pub fn counterexample(&self, trial: &Trial) -> Counterexample {
        trial.counterexample(self.resource_names())
    }

    fn evaluate(&self, seed: u64) -> Result<Trial, TrialError> {
        let _guard = self.trial_lock.lock();

        let mut trial =
            self.scheduler
                .run_trial(&self.registry, &self.workers, self.workload.as_ref(), seed)?;
        let mut violations = self.detector.analyze(&trial.trace);

        let in_cycle: HashSet<WorkerId> = violations
            .iter()
            .filter_map(|v| match v {
                Violation::Deadlock(d) if d.cause == DeadlockCause::WaitCycle => Some(d),
                _ => None,
            })
            .flat_map(|d| d.workers.iter().copied())
            .collect();

        let cause = match trial.termination {
            Termination::Completed => None,
            Termination::Stalled => Some(DeadlockCause::Stalled),
            Termination::StepBudgetExceeded => Some(DeadlockCause::StepBudget),
        };

        match cause {
            None => {
                if let Err(message) = self.workload.check_invariants() {
                    violations.push(Violation::Invariant(InvariantViolation { message }));
                }
            }
            Some(cause) => {
                // Workers already named by a wait cycle are not reported twice.
                let (workers, resources): (Vec<_>, Vec<_>) = trial
                    .pending
                    .iter()
                    .filter(|p| cause == DeadlockCause::StepBudget || p.parked)
                    .filter(|p| !in_cycle.contains(&p.worker))
                    .map(|p| (p.worker, p.resource))
                    .unzip();
                if !workers.is_empty() {
                    violations.push(Violation::Deadlock(DeadlockViolation {
                        cause,
                        workers,
                        resources,
                    }));
                }
            }
        }

        trial.set_violations(violations);
        Ok(trial)
    }
}

/// Builder for [`FuzzCampaign`].
pub struct FuzzCampaignBuilder {
    resources: Vec<String>,
    scenarios: Vec<ScenarioDef>,
    config: CampaignConfig,
    workload: Arc<dyn Workload>,
    detector: ViolationDetector,
    auto_register: bool,
}

impl Default for FuzzCampaignBuilder {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            scenarios: Vec::new(),
            config: CampaignConfig::default(),
            workload: Arc::new(TraceOnly),
            detector: ViolationDetector::default(),
            auto_register: true,
        }
    }
}

impl FuzzCampaignBuilder {
    /// Declare a resource. Declared resources get ids in declaration order.
    pub fn resource(mut self, name: impl Into<String>) -> Self {
        self.resources.push(name.into());
        self
    }

    pub fn resources<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn scenario(mut self, scenario: ScenarioDef) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn scenarios(mut self, scenarios: impl IntoIterator<Item = ScenarioDef>) -> Self {
        self.scenarios.extend(scenarios);
        self
    }

    pub fn config(mut self, config: CampaignConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workload(mut self, workload: Arc<dyn Workload>) -> Self {
        self.workload = workload;
        self
    }

    pub fn detector(mut self, detector: ViolationDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Register resources that scenarios name but were never declared.
    /// On by default.
    pub fn auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = enabled;
        self
    }

    pub fn build(self) -> Result<FuzzCampaign, ConfigError> {
        self.config.validate()?;

        let registry = ResourceRegistry::new();
        for name in &self.resources {
            registry.register(name)?;
        }

        let mut scenarios = Vec::with_capacity(self.scenarios.len());
        let mut workers = Vec::new();
        for def in &self.scenarios {
            let spec = Arc::new(resolve_scenario(def, &registry, self.auto_register)?);
            for _ in 0..def.instances {
                let worker = WorkerId(workers.len() as u32);
                workers.push((Arc::clone(&spec), worker));
            }
            scenarios.push(spec);
        }

        debug!(
            resources = registry.len(),
            scenarios = scenarios.len(),
            workers = workers.len(),
            "campaign built"
        );

        Ok(FuzzCampaign {
            registry,
            scenarios,
            workers,
            workload: self.workload,
            scheduler: InterleavingScheduler::new(self.config.scheduler_config()),
            detector: self.detector,
            config: self.config,
            trial_lock: Mutex::new(()),
        })
    }
}

/// Check lock bracketing within the scenario, then resolve names to ids.
/// Nothing is registered unless the whole scenario is valid.
fn resolve_scenario(
    def: &ScenarioDef,
    registry: &ResourceRegistry,
    auto_register: bool,
) -> Result<ScenarioSpec, ConfigError> {
    if def.instances == 0 {
        return Err(ConfigError::scenario(&def.name, "instances must be at least 1"));
    }
    if def.steps.is_empty() {
        return Err(ConfigError::scenario(&def.name, "scenario has no steps"));
    }

    let mut held = HashSet::new();
    for (index, step) in def.steps.iter().enumerate() {
        let name = step.resource.as_str();
        if !auto_register && registry.lookup(name).is_none() {
            return Err(ConfigError::scenario(
                &def.name,
                format!("step {} uses unknown resource `{}`", index, name),
            ));
        }

        match step.op {
            OpKind::Acquire if !held.insert(name) => {
                return Err(ConfigError::scenario(
                    &def.name,
                    format!("step {} acquires `{}` while already holding it", index, name),
                ));
            }
            OpKind::Release if !held.remove(name) => {
                return Err(ConfigError::scenario(
                    &def.name,
                    format!("step {} releases `{}` without holding it", index, name),
                ));
            }
            _ => {}
        }
    }

    let steps = def
        .steps
        .iter()
        .map(|step| {
            let resource = match registry.lookup(&step.resource) {
                Some(id) => id,
                None => registry.register(&step.resource)?,
            };
            Ok(Step::new(resource, step.op))
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    Ok(ScenarioSpec::new(def.name.clone(), steps))
}

/// Build a campaign from scenario definitions with default settings and
/// run `trial_count` trials from `seeds`.
pub fn run_campaign(
    scenarios: Vec<ScenarioDef>,
    trial_count: u64,
    seeds: &mut SeedSource,
) -> Result<CampaignReport, ConfigError> {
    let campaign = FuzzCampaign::builder().scenarios(scenarios).build()?;
    Ok(campaign.run_campaign(trial_count, seeds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_core::{DetectorConfig, ResourceId};

    fn bracketed(name: &str) -> ScenarioDef {
        ScenarioDef::new(name)
            .acquire("guard")
            .read("balance")
            .write("balance")
            .release("guard")
    }

    fn unbracketed(name: &str) -> ScenarioDef {
        ScenarioDef::new(name).read("balance").write("balance")
    }

    #[test]
    fn test_config_presets() {
        let default = CampaignConfig::default();
        assert_eq!(default.trial_count, 1000);
        assert_eq!(default.max_steps, 10_000);
        assert_eq!(default.master_seed, DEFAULT_MASTER_SEED);
        assert!(CampaignConfig::quick().trial_count < default.trial_count);
        assert!(CampaignConfig::stress().trial_count > default.trial_count);
        assert!(CampaignConfig::stress().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let zero_budget = CampaignConfig {
            max_steps: 0,
            ..CampaignConfig::default()
        };
        assert!(matches!(
            zero_budget.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));

        let huge_delay = CampaignConfig {
            max_delay: u64::MAX,
            ..CampaignConfig::default()
        };
        assert!(huge_delay.validate().is_err());
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let config: CampaignConfig = serde_json::from_str(r#"{"trial_count": 5}"#).unwrap();
        assert_eq!(config.trial_count, 5);
        assert_eq!(config.max_delay, CampaignConfig::default().max_delay);
    }

    #[test]
    fn test_build_assigns_workers() {
        let campaign = FuzzCampaign::builder()
            .scenario(bracketed("deposit").with_instances(2))
            .scenario(bracketed("withdraw"))
            .build()
            .unwrap();

        assert_eq!(campaign.scenarios().len(), 2);
        let ids: Vec<WorkerId> = campaign.workers().iter().map(|(_, w)| *w).collect();
        assert_eq!(ids, vec![WorkerId(0), WorkerId(1), WorkerId(2)]);
        // Auto-registered in first-use order.
        assert_eq!(
            campaign.resource_names(),
            vec!["guard".to_string(), "balance".to_string()]
        );
    }

    #[test]
    fn test_declared_resources_keep_order() {
        let campaign = FuzzCampaign::builder()
            .resources(["balance", "guard"])
            .scenario(bracketed("deposit"))
            .build()
            .unwrap();
        assert_eq!(campaign.registry().lookup("balance"), Some(ResourceId(0)));
        assert_eq!(campaign.registry().lookup("guard"), Some(ResourceId(1)));
    }

    #[test]
    fn test_duplicate_resource() {
        let err = FuzzCampaign::builder()
            .resources(["a", "a"])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Registry(crate::error::RegistryError::DuplicateResource(_))
        ));
    }

    #[test]
    fn test_unknown_resource_without_auto_register() {
        let err = FuzzCampaign::builder()
            .resource("balance")
            .auto_register(false)
            .scenario(bracketed("deposit"))
            .build()
            .unwrap_err();
        match err {
            ConfigError::Scenario { scenario, reason } => {
                assert_eq!(scenario, "deposit");
                assert!(reason.contains("guard"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_scenarios() {
        let cases = [
            ScenarioDef::new("empty"),
            ScenarioDef::new("zero").read("x").with_instances(0),
            ScenarioDef::new("orphan-release").release("x"),
            ScenarioDef::new("double-acquire").acquire("x").acquire("x"),
        ];
        for def in cases {
            let name = def.name.clone();
            let err = FuzzCampaign::builder().scenario(def).build().unwrap_err();
            assert!(
                matches!(err, ConfigError::Scenario { ref scenario, .. } if *scenario == name),
                "{name}: {err}"
            );
        }
    }

    #[test]
    fn test_invalid_scenario_registers_nothing() {
        let registry = ResourceRegistry::new();
        let def = ScenarioDef::new("late-error")
            .acquire("fresh")
            .write("data")
            .release("fresh")
            .release("other");

        let err = resolve_scenario(&def, &registry, true).unwrap_err();
        assert!(matches!(err, ConfigError::Scenario { .. }));
        assert!(registry.is_empty());

        let ok = ScenarioDef::new("ok").acquire("fresh").write("data").release("fresh");
        let spec = resolve_scenario(&ok, &registry, true).unwrap();
        assert_eq!(spec.steps.len(), 3);
        assert_eq!(registry.names(), vec!["fresh".to_string(), "data".to_string()]);
    }

    #[test]
    fn test_lock_leak_is_valid_scenario() {
        let campaign = FuzzCampaign::builder()
            .scenario(ScenarioDef::new("leak").acquire("x"))
            .build();
        assert!(campaign.is_ok());
    }

    #[test]
    fn test_runs_exact_trial_count() {
        let campaign = FuzzCampaign::builder()
            .scenario(unbracketed("rw").with_instances(2))
            .config(CampaignConfig::quick().with_trials(37))
            .build()
            .unwrap();

        let report = campaign.run();
        assert_eq!(report.trials_run, 37);
        assert_eq!(report.master_seed, DEFAULT_MASTER_SEED);
        assert_eq!(
            report.clean_trials + report.violating_seeds().len() as u64,
            37
        );
    }

    #[test]
    fn test_zero_trials() {
        let campaign = FuzzCampaign::builder()
            .scenario(unbracketed("rw"))
            .build()
            .unwrap();
        let report = campaign.run_campaign(0, &mut SeedSource::new(1));
        assert_eq!(report.trials_run, 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_unbracketed_always_races() {
        let campaign = FuzzCampaign::builder()
            .scenario(unbracketed("rw").with_instances(2))
            .config(CampaignConfig::quick())
            .build()
            .unwrap();

        let report = campaign.run();
        assert_eq!(report.clean_trials, 0);
        assert_eq!(report.violating_seeds().len(), 100);
        assert!(report
            .violations
            .iter()
            .all(|v| v.kind == ViolationKind::Race
                && v.involved_workers == vec![WorkerId(0), WorkerId(1)]));
    }

    #[test]
    fn test_leaked_lock_reported_as_stall() {
        let campaign = FuzzCampaign::builder()
            .scenario(ScenarioDef::new("leak").acquire("x"))
            .scenario(ScenarioDef::new("user").acquire("x").release("x"))
            .config(CampaignConfig::quick())
            .build()
            .unwrap();

        let report = campaign.run();
        assert!(report.count(ViolationKind::Deadlock) > 0);
        for record in &report.violations {
            match &record.detail {
                Violation::Deadlock(d) => {
                    assert_eq!(d.cause, DeadlockCause::Stalled);
                    assert_eq!(d.workers, vec![WorkerId(1)]);
                }
                other => panic!("unexpected finding: {other}"),
            }
        }
    }

    #[test]
    fn test_stall_beside_wait_cycle_still_reported() {
        let campaign = FuzzCampaign::builder()
            .scenario(
                ScenarioDef::new("a-then-b")
                    .acquire("a")
                    .acquire("b")
                    .release("b")
                    .release("a"),
            )
            .scenario(
                ScenarioDef::new("b-then-a")
                    .acquire("b")
                    .acquire("a")
                    .release("a")
                    .release("b"),
            )
            .scenario(ScenarioDef::new("leak").acquire("x"))
            .scenario(ScenarioDef::new("waiter").acquire("x").release("x"))
            .build()
            .unwrap();

        let mut both = 0;
        for seed in 0..300 {
            let trial = campaign.replay(seed).unwrap();
            let deadlocks: Vec<&DeadlockViolation> = trial
                .violations
                .iter()
                .filter_map(|v| match v {
                    Violation::Deadlock(d) => Some(d),
                    _ => None,
                })
                .collect();

            for pending in trial.pending.iter().filter(|p| p.parked) {
                assert!(
                    deadlocks.iter().any(|d| d.workers.contains(&pending.worker)),
                    "seed {seed}: parked {} not reported",
                    pending.worker
                );
            }

            let cycle = deadlocks.iter().any(|d| d.cause == DeadlockCause::WaitCycle);
            let stall = deadlocks.iter().find(|d| d.cause == DeadlockCause::Stalled);
            if let (true, Some(stall)) = (cycle, stall) {
                assert_eq!(stall.workers, vec![WorkerId(3)]);
                both += 1;
            }
        }
        assert!(both > 0, "no trial deadlocked and leaked together");
    }

    #[test]
    fn test_step_budget_reported() {
        let long = (0..20).fold(ScenarioDef::new("long"), |def, _| def.read("x"));
        let campaign = FuzzCampaign::builder()
            .scenario(long)
            .config(CampaignConfig {
                max_steps: 5,
                ..CampaignConfig::quick().with_trials(3)
            })
            .build()
            .unwrap();

        let report = campaign.run();
        assert_eq!(report.count(ViolationKind::Deadlock), 3);
        assert!(report.violations.iter().all(|v| matches!(
            &v.detail,
            Violation::Deadlock(d) if d.cause == DeadlockCause::StepBudget
        )));
    }

    #[test]
    fn test_replay_matches_report() {
        let campaign = FuzzCampaign::builder()
            .scenario(unbracketed("rw").with_instances(2))
            .config(CampaignConfig::quick().with_trials(10))
            .build()
            .unwrap();

        let report = campaign.run();
        for record in &report.violations {
            let trial = campaign.replay(record.seed).unwrap();
            assert_eq!(trial.trace, record.trace);
            assert!(trial.violations.contains(&record.detail));
        }
    }

    #[test]
    fn test_detector_config_respected() {
        let campaign = FuzzCampaign::builder()
            .scenario(unbracketed("rw").with_instances(2))
            .detector(ViolationDetector::with_config(DetectorConfig {
                races: false,
                ..DetectorConfig::default()
            }))
            .config(CampaignConfig::quick().with_trials(20))
            .build()
            .unwrap();
        assert!(campaign.run().is_clean());
    }

    #[test]
    fn test_campaign_file() {
        let json = r#"{
            "resources": ["balance", "guard"],
            "scenarios": [
                { "name": "deposit", "instances": 2, "steps": [
                    { "resource": "guard", "op": "acquire" },
                    { "resource": "balance", "op": "read" },
                    { "resource": "balance", "op": "write" },
                    { "resource": "guard", "op": "release" }
                ] }
            ],
            "config": { "trial_count": 25, "master_seed": 7 }
        }"#;

        let file = CampaignFile::from_json(json).unwrap();
        let campaign = file.into_builder().build().unwrap();
        assert_eq!(campaign.config().trial_count, 25);
        assert_eq!(campaign.workers().len(), 2);

        let report = campaign.run();
        assert_eq!(report.master_seed, 7);
        assert_eq!(report.trials_run, 25);
        assert!(report.is_clean(), "{}", report.format());
    }

    #[test]
    fn test_campaign_file_rejects_garbage() {
        assert!(matches!(
            CampaignFile::from_json("{\"scenarios\": 3}"),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_report_format() {
        let campaign = FuzzCampaign::builder()
            .scenario(unbracketed("rw").with_instances(2))
            .config(CampaignConfig::quick().with_trials(2).with_seed(11))
            .build()
            .unwrap();
        let report = campaign.run();
        let text = report.format();
        assert!(text.starts_with("[FAIL] master_seed=11 trials=2 clean=0"));
        assert!(text.contains("Replay: --seed "));

        let json = report.to_json().unwrap();
        let parsed: CampaignReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_free_run_campaign() {
        let report = run_campaign(
            vec![bracketed("a"), bracketed("b")],
            50,
            &mut SeedSource::new(3),
        )
        .unwrap();
        assert_eq!(report.trials_run, 50);
        assert_eq!(report.clean_trials, 50);
    }
}
