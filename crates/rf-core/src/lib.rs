//! # rf-core
//!
//! Trace model and violation detection for racefuzz.
//!
//! This crate provides:
//! - The access trace vocabulary (`AccessEvent`, `ScenarioSpec`, ids)
//! - `ViolationDetector` for races and deadlocks over a trace
//! - `Counterexample` for rendering a failing interleaving
//!
//! It has no notion of scheduling or randomness; `rf-dst` produces the
//! traces this crate analyses.

pub mod counterexample;
pub mod detector;
pub mod types;
pub mod vector_clock;
pub mod violation;

pub use counterexample::Counterexample;
pub use detector::{DetectorConfig, ViolationDetector};
pub use types::{
    AccessEvent, AccessStatus, OpKind, ParseOpKindError, ResourceId, ScenarioDef, ScenarioSpec,
    Stamp, Step, StepDef, Tick, Trace, WorkerId,
};
pub use vector_clock::VectorClock;
pub use violation::{
    DeadlockCause, DeadlockViolation, InvariantViolation, RaceViolation, Violation, ViolationKind,
};
