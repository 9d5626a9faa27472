//! racefuzz: run seeded interleaving campaigns over lock-based scenarios.
//!
//! # Usage
//!
//! ```bash
//! racefuzz run campaign.json --trials 5000 --output report.json
//! racefuzz replay campaign.json --seed 1234567
//! racefuzz catalog abba > abba.json
//! ```
//!
//! Exit codes: 0 when clean, 1 when violations were found, 2 on
//! configuration errors. Logs go to stderr; set `RUST_LOG` to change the
//! level.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rf_runner::{
    build_campaign, catalog_campaign, catalog_listing, exit_code, load_campaign_file,
    render_replay, render_summary, run_and_report, Overrides, EXIT_CLEAN, EXIT_CONFIG_ERROR,
    EXIT_VIOLATIONS,
};

/// Seeded interleaving fuzzer for lock-based critical sections.
#[derive(Parser, Debug)]
#[command(name = "racefuzz")]
#[command(about = "Find data races and deadlocks by fuzzing interleavings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fuzz campaign.
    Run {
        /// Campaign file (JSON).
        campaign: PathBuf,

        /// Number of trials (overrides the file).
        #[arg(long)]
        trials: Option<u64>,

        /// Master seed (overrides the file and RF_SEED).
        #[arg(long)]
        seed: Option<u64>,

        /// Scheduling decisions allowed per trial.
        #[arg(long)]
        max_steps: Option<u64>,

        /// Write the JSON report here.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the JSON report to stdout instead of the summary.
        #[arg(long)]
        json: bool,
    },

    /// Replay a single trial by its seed.
    Replay {
        /// Campaign file (JSON).
        campaign: PathBuf,

        /// Trial seed, as listed in a report.
        #[arg(long)]
        seed: u64,

        /// Scheduling decisions allowed per trial.
        #[arg(long)]
        max_steps: Option<u64>,
    },

    /// Print a built-in scenario as a campaign file, or list them.
    Catalog {
        /// Entry name; lists all entries when omitted.
        name: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Command::Run {
            campaign,
            trials,
            seed,
            max_steps,
            output,
            json,
        } => {
            let file = load_campaign_file(&campaign)?;
            let overrides = Overrides {
                trials,
                seed,
                max_steps,
            };
            let env_seed = rf_dst::seed_from_env()?;
            let fuzz = build_campaign(file, env_seed, &overrides)
                .with_context(|| format!("invalid campaign {}", campaign.display()))?;

            let report = run_and_report(&fuzz, output.as_deref())?;
            if json {
                println!("{}", report.to_json()?);
            } else {
                println!("{}", render_summary(&fuzz, &report));
            }
            Ok(exit_code(&report))
        }

        Command::Replay {
            campaign,
            seed,
            max_steps,
        } => {
            let file = load_campaign_file(&campaign)?;
            let overrides = Overrides {
                max_steps,
                ..Overrides::default()
            };
            let fuzz = build_campaign(file, None, &overrides)
                .with_context(|| format!("invalid campaign {}", campaign.display()))?;

            let trial = match fuzz.replay(seed) {
                Ok(trial) => trial,
                Err(e) => {
                    eprintln!("Trial {} aborted: {}", seed, e);
                    return Ok(EXIT_VIOLATIONS);
                }
            };
            println!("{}", render_replay(&fuzz, &trial)?);
            Ok(if trial.is_clean() {
                EXIT_CLEAN
            } else {
                EXIT_VIOLATIONS
            })
        }

        Command::Catalog { name } => {
            let value = match name {
                Some(name) => serde_json::to_value(catalog_campaign(&name)?)?,
                None => catalog_listing(),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(EXIT_CLEAN)
        }
    }
}
