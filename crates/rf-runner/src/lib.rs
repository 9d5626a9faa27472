//! # rf-runner
//!
//! Glue between campaign files on disk and `rf-dst`: loading, config
//! layering, and the outputs of the `racefuzz` binary.
//!
//! Config layers, lowest first: built-in defaults, the file's `config`
//! section, `RF_SEED`, command-line overrides.

use std::path::{Path, PathBuf};

use serde_json::json;
use thiserror::Error;
use tracing::info;

use rf_core::ScenarioDef;
use rf_dst::{CampaignConfig, CampaignFile, CampaignReport, ConfigError, FuzzCampaign, Trial};
use rf_scenarios::{catalog, CatalogEntry};

/// Exit code for a run with no findings.
pub const EXIT_CLEAN: u8 = 0;
/// Exit code for a run with findings or aborted trials.
pub const EXIT_VIOLATIONS: u8 = 1;
/// Exit code for configuration and I/O errors.
pub const EXIT_CONFIG_ERROR: u8 = 2;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("no catalog entry named `{0}`")]
    UnknownEntry(String),
}

/// Command-line settings that override the file's config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overrides {
    pub trials: Option<u64>,
    pub seed: Option<u64>,
    pub max_steps: Option<u64>,
}

/// Apply the config layers on top of `base` (defaults or the file's section).
pub fn layer_config(
    base: Option<CampaignConfig>,
    env_seed: Option<u64>,
    overrides: &Overrides,
) -> CampaignConfig {
    let mut config = base.unwrap_or_default();
    if let Some(seed) = env_seed {
        config.master_seed = seed;
    }
    if let Some(trials) = overrides.trials {
        config.trial_count = trials;
    }
    if let Some(seed) = overrides.seed {
        config.master_seed = seed;
    }
    if let Some(max_steps) = overrides.max_steps {
        config.max_steps = max_steps;
    }
    config
}

pub fn load_campaign_file(path: &Path) -> Result<CampaignFile, RunnerError> {
    let json = std::fs::read_to_string(path).map_err(|source| RunnerError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(CampaignFile::from_json(&json)?)
}

/// Build a campaign from a file with all config layers applied.
pub fn build_campaign(
    mut file: CampaignFile,
    env_seed: Option<u64>,
    overrides: &Overrides,
) -> Result<FuzzCampaign, RunnerError> {
    let config = layer_config(file.config.take(), env_seed, overrides);
    info!(
        trial_count = config.trial_count,
        master_seed = config.master_seed,
        max_steps = config.max_steps,
        "campaign configured"
    );
    Ok(file.into_builder().config(config).build()?)
}

/// Run a campaign and write the JSON report to `output` if given.
pub fn run_and_report(
    campaign: &FuzzCampaign,
    output: Option<&Path>,
) -> Result<CampaignReport, RunnerError> {
    let report = campaign.run();
    if let Some(path) = output {
        std::fs::write(path, report.to_json()?).map_err(|source| RunnerError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "report written");
    }
    Ok(report)
}

/// Human-readable summary: status line plus a diagram of the first failing
/// trial.
pub fn render_summary(campaign: &FuzzCampaign, report: &CampaignReport) -> String {
    let mut text = report.format();
    if let Some(&seed) = report.violating_seeds().first() {
        if let Ok(trial) = campaign.replay(seed) {
            text.push_str("\n\nFirst counterexample:\n");
            text.push_str(&campaign.counterexample(&trial).render_diagram());
        }
    }
    text
}

/// Replay output: the diagram, then the trial as JSON.
pub fn render_replay(campaign: &FuzzCampaign, trial: &Trial) -> Result<String, RunnerError> {
    let mut text = campaign.counterexample(trial).render_diagram();
    text.push('\n');
    text.push_str(&serde_json::to_string_pretty(trial)?);
    Ok(text)
}

pub fn exit_code(report: &CampaignReport) -> u8 {
    if report.is_clean() {
        EXIT_CLEAN
    } else {
        EXIT_VIOLATIONS
    }
}

/// Campaign file for a catalog entry.
pub fn catalog_campaign(name: &str) -> Result<CampaignFile, RunnerError> {
    let entry = rf_scenarios::entry(name).ok_or_else(|| RunnerError::UnknownEntry(name.to_string()))?;
    Ok(entry_file(entry.scenarios))
}

fn entry_file(scenarios: Vec<ScenarioDef>) -> CampaignFile {
    CampaignFile {
        resources: None,
        scenarios,
        config: Some(CampaignConfig::default()),
    }
}

/// Listing of catalog entries as JSON.
pub fn catalog_listing() -> serde_json::Value {
    let entries: Vec<serde_json::Value> = catalog()
        .iter()
        .map(|entry: &CatalogEntry| {
            json!({
                "name": entry.name,
                "expected": format!("{:?}", entry.expected),
                "scenarios": entry.scenarios.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "entries": entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_order() {
        let file = CampaignConfig {
            trial_count: 50,
            master_seed: 1,
            ..CampaignConfig::default()
        };

        let only_file = layer_config(Some(file), None, &Overrides::default());
        assert_eq!(only_file.trial_count, 50);
        assert_eq!(only_file.master_seed, 1);

        let with_env = layer_config(Some(file), Some(2), &Overrides::default());
        assert_eq!(with_env.master_seed, 2);

        let cli = Overrides {
            trials: Some(7),
            seed: Some(3),
            max_steps: Some(99),
        };
        let with_cli = layer_config(Some(file), Some(2), &cli);
        assert_eq!(with_cli.trial_count, 7);
        assert_eq!(with_cli.master_seed, 3);
        assert_eq!(with_cli.max_steps, 99);
    }

    #[test]
    fn test_defaults_without_file_config() {
        let config = layer_config(None, None, &Overrides::default());
        assert_eq!(config, CampaignConfig::default());
    }

    #[test]
    fn test_catalog_campaign() {
        let file = catalog_campaign("abba").unwrap();
        assert_eq!(file.scenarios.len(), 2);
        assert!(matches!(
            catalog_campaign("missing"),
            Err(RunnerError::UnknownEntry(_))
        ));
    }

    #[test]
    fn test_catalog_listing() {
        let listing = catalog_listing();
        let entries = listing["entries"].as_array().unwrap();
        assert!(entries.iter().any(|e| e["name"] == "abba"));
    }

    #[test]
    fn test_exit_codes() {
        let file = catalog_campaign("bracketed-deposit").unwrap();
        let overrides = Overrides {
            trials: Some(20),
            ..Overrides::default()
        };
        let campaign = build_campaign(file, None, &overrides).unwrap();
        let report = campaign.run();
        assert_eq!(exit_code(&report), EXIT_CLEAN);

        let file = catalog_campaign("wrong-lock").unwrap();
        let campaign = build_campaign(file, None, &overrides).unwrap();
        let report = campaign.run();
        assert_eq!(exit_code(&report), EXIT_VIOLATIONS);
        assert!(render_summary(&campaign, &report).contains("First counterexample"));
    }
}
