//! The two-worker balance scenario from the design notes, run as full
//! campaigns with the bank workload attached.

use rf_core::{ViolationKind, WorkerId};
use rf_dst::{CampaignConfig, TrialOutcome};
use rf_scenarios::bank_campaign;

#[test]
fn test_bracketed_balance_is_clean_over_1000_trials() {
    let campaign = bank_campaign(true, 2, CampaignConfig::default()).unwrap();
    let report = campaign.run();

    assert_eq!(report.trials_run, 1000);
    assert_eq!(report.clean_trials, 1000, "{}", report.format());
    assert!(report.violations.is_empty());
    assert!(report.trial_errors.is_empty());
}

#[test]
fn test_unguarded_balance_races() {
    let campaign = bank_campaign(false, 2, CampaignConfig::default()).unwrap();
    let report = campaign.run();

    assert_eq!(report.trials_run, 1000);
    assert!(report.count(ViolationKind::Race) > 0);
    for record in report.violations.iter().filter(|v| v.kind == ViolationKind::Race) {
        assert_eq!(record.involved_workers, vec![WorkerId(0), WorkerId(1)]);
    }
}

#[test]
fn test_unguarded_balance_loses_updates() {
    let campaign = bank_campaign(false, 2, CampaignConfig::default()).unwrap();
    let report = campaign.run();

    // Only some interleavings put both reads before both writes.
    let lost = report.count(ViolationKind::Invariant);
    assert!(lost > 0);
    assert!(lost < 1000);

    let record = report
        .violations
        .iter()
        .find(|v| v.kind == ViolationKind::Invariant)
        .unwrap();
    let trial = campaign.replay(record.seed).unwrap();
    assert_eq!(trial.outcome, TrialOutcome::RaceDetected);
    assert!(trial
        .violations
        .iter()
        .any(|v| v.kind() == ViolationKind::Invariant));
}

#[test]
fn test_replayed_trace_is_byte_identical() {
    let campaign = bank_campaign(false, 3, CampaignConfig::quick()).unwrap();
    let report = campaign.run();
    assert!(!report.violations.is_empty());

    for record in report.violations.iter().take(20) {
        let trial = campaign.replay(record.seed).unwrap();
        assert_eq!(
            serde_json::to_string(&trial.trace).unwrap(),
            serde_json::to_string(&record.trace).unwrap()
        );
    }
}

#[test]
fn test_counterexample_names_resources() {
    let campaign = bank_campaign(false, 2, CampaignConfig::quick()).unwrap();
    let report = campaign.run();
    let seed = report.violating_seeds()[0];

    let trial = campaign.replay(seed).unwrap();
    let diagram = campaign.counterexample(&trial).render_diagram();
    assert!(diagram.contains(&format!("Seed: {}", seed)));
    assert!(diagram.contains("write(balance)"));
    assert!(diagram.contains("Data race on balance"));
}
