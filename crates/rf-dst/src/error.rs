//! Error types.
//!
//! Configuration faults stop a campaign before it starts. Trial faults abort
//! one trial and are recorded in the report. Races and deadlocks are
//! findings and never appear here.

use rf_core::{ResourceId, WorkerId};
use thiserror::Error;

/// Faults raised by the shared resource registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("resource `{0}` is already registered")]
    DuplicateResource(String),

    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),

    #[error("{worker} released {resource} without holding it")]
    NotHolder {
        resource: ResourceId,
        worker: WorkerId,
    },

    #[error("{worker} acquired {resource} while already holding it")]
    Reentrant {
        resource: ResourceId,
        worker: WorkerId,
    },
}

/// Faults detected while setting up a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("scenario `{scenario}`: {reason}")]
    Scenario { scenario: String, reason: String },

    #[error("invalid campaign configuration: {0}")]
    InvalidConfig(String),
}

impl ConfigError {
    pub(crate) fn scenario(scenario: &str, reason: impl Into<String>) -> Self {
        ConfigError::Scenario {
            scenario: scenario.to_string(),
            reason: reason.into(),
        }
    }
}

/// Faults that abort a single trial.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrialError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("scenario `{scenario}`: {reason}")]
    Scenario { scenario: String, reason: String },

    #[error("{worker} failed at step {step}: {message}")]
    Workload {
        worker: WorkerId,
        step: usize,
        message: String,
    },
}
