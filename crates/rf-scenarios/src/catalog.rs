//! Catalog of small locking scenarios with known verdicts.
//!
//! | Entry | Bug | Expected finding |
//! |-------|-----|------------------|
//! | `bracketed-deposit` | none | clean |
//! | `unguarded-deposit` | no lock around read-modify-write | race |
//! | `wrong-lock` | two mutexes guard the same cell | race |
//! | `unguarded-reader` | reader skips the writer's lock | race |
//! | `abba` | opposite acquisition order | deadlock |
//! | `gated-abba` | opposite order, but under a common outer lock | clean |
//! | `lock-leak` | lock never released | deadlock (stalled) |
//! | `dining-philosophers` | circular fork order | deadlock |
//! | `ordered-philosophers` | forks taken lowest first | clean |

use rf_core::{ScenarioDef, ViolationKind};

use crate::bank::{deposit_bracketed, deposit_unguarded};

/// Verdict a catalog entry must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// No finding in any trial.
    Clean,
    /// This kind of finding in every trial.
    Always(ViolationKind),
    /// This kind of finding in at least one trial.
    Sometimes(ViolationKind),
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub scenarios: Vec<ScenarioDef>,
    pub expected: Expected,
}

impl CatalogEntry {
    fn new(name: &'static str, scenarios: Vec<ScenarioDef>, expected: Expected) -> Self {
        Self {
            name,
            scenarios,
            expected,
        }
    }
}

pub fn abba() -> Vec<ScenarioDef> {
    vec![
        ScenarioDef::new("lock-a-then-b")
            .acquire("a")
            .acquire("b")
            .write("shared")
            .release("b")
            .release("a"),
        ScenarioDef::new("lock-b-then-a")
            .acquire("b")
            .acquire("a")
            .write("shared")
            .release("a")
            .release("b"),
    ]
}

pub fn wrong_lock() -> Vec<ScenarioDef> {
    vec![
        ScenarioDef::new("under-m1")
            .acquire("m1")
            .read("cell")
            .write("cell")
            .release("m1"),
        ScenarioDef::new("under-m2")
            .acquire("m2")
            .read("cell")
            .write("cell")
            .release("m2"),
    ]
}

pub fn unguarded_reader() -> Vec<ScenarioDef> {
    vec![
        ScenarioDef::new("writer")
            .acquire("lock")
            .write("config")
            .release("lock"),
        ScenarioDef::new("reader").read("config").with_instances(2),
    ]
}

pub fn lock_leak() -> Vec<ScenarioDef> {
    vec![
        ScenarioDef::new("leaker").acquire("lock").write("data"),
        ScenarioDef::new("waiter")
            .acquire("lock")
            .write("data")
            .release("lock"),
    ]
}

/// ABBA with both nestings taken under `gate`, so they never overlap.
pub fn gated_abba() -> Vec<ScenarioDef> {
    abba()
        .into_iter()
        .map(|def| {
            let mut gated = ScenarioDef::new(format!("gated-{}", def.name)).acquire("gate");
            gated.steps.extend(def.steps);
            gated.release("gate")
        })
        .collect()
}

fn fork(i: u32) -> String {
    format!("fork-{}", i)
}

/// `seats` philosophers, each taking the left fork then the right one.
pub fn dining_philosophers(seats: u32) -> Vec<ScenarioDef> {
    (0..seats)
        .map(|i| philosopher(i, fork(i), fork((i + 1) % seats)))
        .collect()
}

/// Same table, but every philosopher takes the lower-numbered fork first.
pub fn ordered_philosophers(seats: u32) -> Vec<ScenarioDef> {
    (0..seats)
        .map(|i| {
            let (left, right) = (i, (i + 1) % seats);
            philosopher(i, fork(left.min(right)), fork(left.max(right)))
        })
        .collect()
}

fn philosopher(seat: u32, first: String, second: String) -> ScenarioDef {
    ScenarioDef::new(format!("philosopher-{}", seat))
        .acquire(first.clone())
        .acquire(second.clone())
        .release(second)
        .release(first)
}

/// Every catalog entry.
pub fn catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new(
            "bracketed-deposit",
            vec![deposit_bracketed().with_instances(3)],
            Expected::Clean,
        ),
        CatalogEntry::new(
            "unguarded-deposit",
            vec![deposit_unguarded().with_instances(2)],
            Expected::Always(ViolationKind::Race),
        ),
        CatalogEntry::new("wrong-lock", wrong_lock(), Expected::Always(ViolationKind::Race)),
        CatalogEntry::new(
            "unguarded-reader",
            unguarded_reader(),
            Expected::Always(ViolationKind::Race),
        ),
        CatalogEntry::new("abba", abba(), Expected::Always(ViolationKind::Deadlock)),
        CatalogEntry::new("gated-abba", gated_abba(), Expected::Clean),
        CatalogEntry::new(
            "lock-leak",
            lock_leak(),
            Expected::Sometimes(ViolationKind::Deadlock),
        ),
        CatalogEntry::new(
            "dining-philosophers",
            dining_philosophers(4),
            Expected::Always(ViolationKind::Deadlock),
        ),
        CatalogEntry::new("ordered-philosophers", ordered_philosophers(4), Expected::Clean),
    ]
}

/// Look up one entry by name.
pub fn entry(name: &str) -> Option<CatalogEntry> {
    catalog().into_iter().find(|e| e.name == name)
}
