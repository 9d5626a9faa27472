//! # rf-dst
//!
//! Deterministic interleaving fuzzer for lock-based critical sections.
//!
//! Workers run scenario steps on a simulated clock. Start offsets, step
//! delays and tie-breaks all come from a seed, so every trial can be
//! reproduced exactly from its seed.
//!
//! ## Usage
//!
//! ```rust
//! use rf_core::ScenarioDef;
//! use rf_dst::{CampaignConfig, FuzzCampaign};
//!
//! let deposit = ScenarioDef::new("deposit")
//!     .read("balance")
//!     .write("balance")
//!     .with_instances(2);
//!
//! let campaign = FuzzCampaign::builder()
//!     .scenario(deposit)
//!     .config(CampaignConfig::quick())
//!     .build()
//!     .unwrap();
//!
//! let report = campaign.run();
//! assert!(!report.is_clean());
//!
//! // Any finding can be replayed from its seed.
//! let seed = report.violations[0].seed;
//! let trial = campaign.replay(seed).unwrap();
//! assert_eq!(trial.trace, report.violations[0].trace);
//! ```
//!
//! ## Reproducibility
//!
//! To rerun a whole campaign from a known master seed:
//! ```bash
//! RF_SEED=12345 cargo test
//! ```

pub mod campaign;
pub mod error;
pub mod random;
pub mod registry;
pub mod scheduler;
pub mod workload;

pub use campaign::{
    run_campaign, CampaignConfig, CampaignFile, CampaignReport, FuzzCampaign,
    FuzzCampaignBuilder, TrialErrorRecord, ViolationRecord, DEFAULT_MASTER_SEED,
};
pub use error::{ConfigError, RegistryError, TrialError};
pub use random::{DeterministicRng, SeedSource};
pub use registry::ResourceRegistry;
pub use scheduler::{
    InterleavingScheduler, PendingStep, Schedule, SchedulerConfig, Termination, Trial,
    TrialOutcome,
};
pub use workload::{TraceOnly, Workload};

/// Environment variable holding a master seed.
pub const SEED_ENV_VAR: &str = "RF_SEED";

/// Master seed from `RF_SEED`, if set.
pub fn seed_from_env() -> Result<Option<u64>, ConfigError> {
    match std::env::var(SEED_ENV_VAR) {
        Ok(s) => {
            let seed = s.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidConfig(format!("{} must be a valid u64, got `{}`", SEED_ENV_VAR, s))
            })?;
            tracing::info!(seed, "RF_SEED={} (from environment)", seed);
            Ok(Some(seed))
        }
        Err(_) => Ok(None),
    }
}

/// Master seed from `RF_SEED`, or a random one.
///
/// The seed is logged so the run can be reproduced with `RF_SEED=<seed>`.
pub fn get_or_generate_seed() -> Result<u64, ConfigError> {
    if let Some(seed) = seed_from_env()? {
        return Ok(seed);
    }
    let seed = rand::random::<u64>();
    tracing::info!(seed, "RF_SEED={} (randomly generated)", seed);
    Ok(seed)
}
