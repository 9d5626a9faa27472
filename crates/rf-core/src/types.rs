//! Trace vocabulary shared by the registry, scheduler and detector.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dense identifier of a registered shared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u32);

impl ResourceId {
    /// Index into per-resource tables.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Identifier of one simulated worker within a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u32);

impl WorkerId {
    /// Index into per-worker tables.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}", self.0)
    }
}

/// Kind of access a step performs on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Read,
    Write,
    Acquire,
    Release,
}

impl OpKind {
    /// Plain data access (as opposed to a synchronization operation).
    #[inline]
    pub fn is_data(self) -> bool {
        matches!(self, OpKind::Read | OpKind::Write)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Read => "read",
            OpKind::Write => "write",
            OpKind::Acquire => "acquire",
            OpKind::Release => "release",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an operation name is not one of the four kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation kind `{0}` (expected read, write, acquire or release)")]
pub struct ParseOpKindError(pub String);

impl FromStr for OpKind {
    type Err = ParseOpKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(OpKind::Read),
            "write" => Ok(OpKind::Write),
            "acquire" | "lock" => Ok(OpKind::Acquire),
            "release" | "unlock" => Ok(OpKind::Release),
            _ => Err(ParseOpKindError(s.to_string())),
        }
    }
}

/// Whether an access took effect or the worker had to wait.
///
/// Only `acquire` can be `Blocked`. Blocked attempts stay in the trace so the
/// wait-for graph can be rebuilt from the trace alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessStatus {
    Granted,
    Blocked,
}

/// Virtual time in scheduler ticks.
pub type Tick = u64;

/// Timing attached to an access when it is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stamp {
    /// Tick at which the step executed.
    pub timestamp: Tick,
    /// Delay injected at the checkpoint following this step.
    pub delay: Tick,
}

/// One recorded access. Immutable once appended to a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    /// Position in the global trace.
    pub seq: u64,
    pub resource: ResourceId,
    pub worker: WorkerId,
    pub op: OpKind,
    pub status: AccessStatus,
    pub timestamp: Tick,
    pub delay: Tick,
}

impl AccessEvent {
    #[inline]
    pub fn is_granted(&self) -> bool {
        self.status == AccessStatus::Granted
    }
}

impl fmt::Display for AccessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} t={} {} {}({})",
            self.seq, self.timestamp, self.worker, self.op, self.resource
        )?;
        if self.status == AccessStatus::Blocked {
            f.write_str(" [blocked]")?;
        }
        Ok(())
    }
}

/// The trace of one trial, in execution order.
pub type Trace = Vec<AccessEvent>;

/// A resolved scenario step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Step {
    pub resource: ResourceId,
    pub op: OpKind,
}

impl Step {
    pub fn new(resource: ResourceId, op: OpKind) -> Self {
        Self { resource, op }
    }
}

/// A scenario step as written by the test author, by resource name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDef {
    pub resource: String,
    pub op: OpKind,
}

impl StepDef {
    pub fn new(resource: impl Into<String>, op: OpKind) -> Self {
        Self {
            resource: resource.into(),
            op,
        }
    }
}

/// Declarative scenario input: a named critical section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDef {
    pub name: String,
    /// Number of workers running this scenario concurrently.
    #[serde(default = "default_instances")]
    pub instances: u32,
    pub steps: Vec<StepDef>,
}

fn default_instances() -> u32 {
    1
}

impl ScenarioDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: 1,
            steps: Vec::new(),
        }
    }

    /// Append a step.
    pub fn step(mut self, resource: impl Into<String>, op: OpKind) -> Self {
        self.steps.push(StepDef::new(resource, op));
        self
    }

    /// Run this scenario on `instances` workers.
    pub fn with_instances(mut self, instances: u32) -> Self {
        self.instances = instances;
        self
    }

    pub fn acquire(self, resource: impl Into<String>) -> Self {
        self.step(resource, OpKind::Acquire)
    }

    pub fn release(self, resource: impl Into<String>) -> Self {
        self.step(resource, OpKind::Release)
    }

    pub fn read(self, resource: impl Into<String>) -> Self {
        self.step(resource, OpKind::Read)
    }

    pub fn write(self, resource: impl Into<String>) -> Self {
        self.step(resource, OpKind::Write)
    }
}

/// A scenario whose steps reference registered resources.
///
/// Immutable once built; shared read-only by every worker that runs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    pub steps: Vec<Step>,
}

impl ScenarioSpec {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Distinct resources this scenario touches, in first-use order.
    pub fn resources(&self) -> Vec<ResourceId> {
        let mut seen = Vec::new();
        for step in &self.steps {
            if !seen.contains(&step.resource) {
                seen.push(step.resource);
            }
        }
        seen
    }
}
