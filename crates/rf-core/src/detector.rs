//! Violation detection over a recorded trace.
//!
//! # Races
//!
//! Two data accesses to the same resource race when:
//!
//! | Condition | Meaning |
//! |-----------|---------|
//! | different workers | a worker never races with itself |
//! | one is a write | concurrent reads are benign |
//! | disjoint locksets | no acquired resource brackets both accesses |
//! | concurrent clocks | no release→acquire chain orders them |
//!
//! Vector clocks advance on every granted access; a granted `acquire` merges
//! the clock published by the last `release` of the same resource.
//!
//! # Deadlocks
//!
//! - Wait cycle: holders and pending blocked acquires at the end of the trace
//!   form a wait-for graph; every cycle is a deadlock that actually happened.
//! - Lock-order inversion: acquiring `r` while holding `h` adds `h -> r` to an
//!   acquisition-order graph, labelled with the worker and the other locks it
//!   held (its guards). A cycle is a deadlock this interleaving happened to
//!   avoid when its edges can be taken by distinct workers with pairwise
//!   disjoint guards. A common guard (a gate lock) keeps the edges from ever
//!   being in flight together.
//!
//! Detection is exhaustive: every finding in the trace is reported.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{AccessEvent, AccessStatus, OpKind, ResourceId, WorkerId};
use crate::vector_clock::VectorClock;
use crate::violation::{DeadlockCause, DeadlockViolation, RaceViolation, Violation};

/// Upper bound on lock-order cycles enumerated per trace.
const ORDER_CYCLES_COUNT_MAX: usize = 256;

/// Which analyses to run.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub races: bool,
    pub wait_cycles: bool,
    pub lock_order: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            races: true,
            wait_cycles: true,
            lock_order: true,
        }
    }
}

/// Analyses traces for races and deadlocks.
#[derive(Debug, Clone, Default)]
pub struct ViolationDetector {
    config: DetectorConfig,
}

/// A data access with the synchronization context it ran under.
struct DataAccess {
    event: AccessEvent,
    clock: VectorClock,
    lockset: BTreeSet<ResourceId>,
}

/// One acquisition in the order graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct OrderEdge {
    worker: WorkerId,
    /// Other resources held while acquiring.
    guards: BTreeSet<ResourceId>,
}

impl OrderEdge {
    fn compatible(&self, other: &OrderEdge) -> bool {
        self.worker != other.worker && self.guards.is_disjoint(&other.guards)
    }
}

/// State rebuilt by replaying a trace.
#[derive(Default)]
struct Replay {
    clocks: BTreeMap<WorkerId, VectorClock>,
    release_clocks: BTreeMap<ResourceId, VectorClock>,
    held: BTreeMap<WorkerId, BTreeSet<ResourceId>>,
    holders: BTreeMap<ResourceId, WorkerId>,
    waiting: BTreeMap<WorkerId, ResourceId>,
    accesses: BTreeMap<ResourceId, Vec<DataAccess>>,
    /// (held, acquired) -> acquisitions in that order
    order_edges: BTreeMap<ResourceId, BTreeMap<ResourceId, BTreeSet<OrderEdge>>>,
}

impl Replay {
    fn run(trace: &[AccessEvent]) -> Self {
        let mut replay = Self::default();
        for event in trace {
            replay.apply(event);
        }
        replay
    }

    fn apply(&mut self, event: &AccessEvent) {
        let worker = event.worker;
        let resource = event.resource;
        let held = self.held.entry(worker).or_default();

        if event.op == OpKind::Acquire {
            for &h in held.iter() {
                if h != resource {
                    let guards = held.iter().copied().filter(|&g| g != h).collect();
                    self.order_edges
                        .entry(h)
                        .or_default()
                        .entry(resource)
                        .or_default()
                        .insert(OrderEdge { worker, guards });
                }
            }
        }

        if event.status == AccessStatus::Blocked {
            self.waiting.insert(worker, resource);
            return;
        }

        let clock = self.clocks.entry(worker).or_default();
        clock.tick(worker);

        match event.op {
            OpKind::Acquire => {
                if let Some(published) = self.release_clocks.get(&resource) {
                    clock.merge(published);
                }
                if self.waiting.get(&worker) == Some(&resource) {
                    self.waiting.remove(&worker);
                }
                held.insert(resource);
                self.holders.insert(resource, worker);
            }
            OpKind::Release => {
                self.release_clocks.insert(resource, clock.clone());
                held.remove(&resource);
                if self.holders.get(&resource) == Some(&worker) {
                    self.holders.remove(&resource);
                }
            }
            OpKind::Read | OpKind::Write => {
                self.accesses.entry(resource).or_default().push(DataAccess {
                    event: event.clone(),
                    clock: clock.clone(),
                    lockset: held.clone(),
                });
            }
        }
    }
}

impl ViolationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Analyse a trace and return every violation found in it.
    pub fn analyze(&self, trace: &[AccessEvent]) -> Vec<Violation> {
        debug_assert!(
            trace.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
            "trace timestamps must be non-decreasing"
        );

        let replay = Replay::run(trace);
        let mut violations = Vec::new();

        if self.config.races {
            violations.extend(find_races(&replay).into_iter().map(Violation::Race));
        }

        let wait_cycles = if self.config.wait_cycles {
            find_wait_cycles(&replay)
        } else {
            Vec::new()
        };

        if self.config.lock_order {
            let deadlocked: Vec<BTreeSet<ResourceId>> = wait_cycles
                .iter()
                .map(|d| d.resources.iter().copied().collect())
                .collect();
            for inversion in find_order_inversions(&replay) {
                let set: BTreeSet<ResourceId> = inversion.resources.iter().copied().collect();
                if !deadlocked.contains(&set) {
                    violations.push(Violation::Deadlock(inversion));
                }
            }
        }

        violations.extend(wait_cycles.into_iter().map(Violation::Deadlock));
        violations
    }

    /// Convenience for callers that only need a yes/no.
    pub fn is_clean(&self, trace: &[AccessEvent]) -> bool {
        self.analyze(trace).is_empty()
    }
}

fn find_races(replay: &Replay) -> Vec<RaceViolation> {
    let mut races = Vec::new();

    for (&resource, accesses) in &replay.accesses {
        let mut reported: BTreeSet<(WorkerId, WorkerId)> = BTreeSet::new();

        for (i, a) in accesses.iter().enumerate() {
            for b in &accesses[i + 1..] {
                if a.event.worker == b.event.worker {
                    continue;
                }
                if a.event.op != OpKind::Write && b.event.op != OpKind::Write {
                    continue;
                }
                let pair = if a.event.worker < b.event.worker {
                    (a.event.worker, b.event.worker)
                } else {
                    (b.event.worker, a.event.worker)
                };
                if reported.contains(&pair) {
                    continue;
                }
                if !a.lockset.is_disjoint(&b.lockset) {
                    continue;
                }
                if !a.clock.concurrent(&b.clock) {
                    continue;
                }

                reported.insert(pair);
                races.push(RaceViolation {
                    resource,
                    worker_a: pair.0,
                    worker_b: pair.1,
                    events: vec![a.event.clone(), b.event.clone()],
                });
            }
        }
    }

    races
}

/// Every blocked worker has exactly one outgoing wait edge, so cycles are
/// found by walking successor chains.
fn find_wait_cycles(replay: &Replay) -> Vec<DeadlockViolation> {
    let successor = |worker: WorkerId| -> Option<WorkerId> {
        let resource = replay.waiting.get(&worker)?;
        let holder = *replay.holders.get(resource)?;
        (holder != worker).then_some(holder)
    };

    let mut done: BTreeSet<WorkerId> = BTreeSet::new();
    let mut cycles = Vec::new();

    for &start in replay.waiting.keys() {
        if done.contains(&start) {
            continue;
        }

        let mut path: Vec<WorkerId> = Vec::new();
        let mut current = Some(start);

        while let Some(worker) = current {
            if done.contains(&worker) {
                break;
            }
            if let Some(pos) = path.iter().position(|&w| w == worker) {
                let mut cycle = path[pos..].to_vec();
                let min_pos = cycle
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, w)| **w)
                    .map_or(0, |(i, _)| i);
                cycle.rotate_left(min_pos);
                let resources = cycle
                    .iter()
                    .filter_map(|w| replay.waiting.get(w).copied())
                    .collect();
                cycles.push(DeadlockViolation {
                    cause: DeadlockCause::WaitCycle,
                    workers: cycle,
                    resources,
                });
                break;
            }
            path.push(worker);
            current = successor(worker);
        }

        done.extend(path);
    }

    cycles
}

fn find_order_inversions(replay: &Replay) -> Vec<DeadlockViolation> {
    let mut cycles: Vec<Vec<ResourceId>> = Vec::new();
    let nodes: Vec<ResourceId> = replay.order_edges.keys().copied().collect();

    for &start in &nodes {
        let mut path = vec![start];
        collect_cycles(replay, start, start, &mut path, &mut cycles);
        if cycles.len() >= ORDER_CYCLES_COUNT_MAX {
            break;
        }
    }

    cycles
        .into_iter()
        .filter_map(|resources| {
            let labels: Vec<&BTreeSet<OrderEdge>> = (0..resources.len())
                .map(|i| {
                    let from = resources[i];
                    let to = resources[(i + 1) % resources.len()];
                    &replay.order_edges[&from][&to]
                })
                .collect();
            let mut chosen = Vec::with_capacity(labels.len());
            assign_edges(&labels, &mut chosen).then(|| DeadlockViolation {
                cause: DeadlockCause::LockOrderInversion,
                workers: chosen.iter().map(|edge| edge.worker).collect(),
                resources,
            })
        })
        .collect()
}

/// Enumerate elementary cycles through `start` whose other nodes are all
/// greater than `start`, so each cycle is found once.
fn collect_cycles(
    replay: &Replay,
    start: ResourceId,
    node: ResourceId,
    path: &mut Vec<ResourceId>,
    cycles: &mut Vec<Vec<ResourceId>>,
) {
    let Some(edges) = replay.order_edges.get(&node) else {
        return;
    };
    for &next in edges.keys() {
        if cycles.len() >= ORDER_CYCLES_COUNT_MAX {
            return;
        }
        if next == start {
            cycles.push(path.clone());
        } else if next > start && !path.contains(&next) {
            path.push(next);
            collect_cycles(replay, start, next, path, cycles);
            path.pop();
        }
    }
}

/// Pick one acquisition per cycle edge, pairwise compatible.
fn assign_edges<'a>(
    labels: &[&'a BTreeSet<OrderEdge>],
    chosen: &mut Vec<&'a OrderEdge>,
) -> bool {
    let Some(candidates) = labels.get(chosen.len()) else {
        return true;
    };
    for edge in candidates.iter() {
        if !chosen.iter().all(|c| c.compatible(edge)) {
            continue;
        }
        chosen.push(edge);
        if assign_edges(labels, chosen) {
            return true;
        }
        chosen.pop();
    }
    false
}
