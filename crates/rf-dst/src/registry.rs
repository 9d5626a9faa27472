//! Shared resource registry.
//!
//! The registry names every shared resource, tracks lock holders, and
//! records each access as an `AccessEvent`. It is the only place where trial
//! state is shared, so all of it lives behind one mutex: an access and its
//! log entry are committed together, and `seq` numbers follow commit order.
//!
//! Under `--cfg loom` the mutex is loom's, so the registry itself can be
//! model-checked.

use std::collections::HashMap;

#[cfg(loom)]
use loom::sync::Mutex;
#[cfg(not(loom))]
use parking_lot::Mutex;

use rf_core::{AccessEvent, AccessStatus, OpKind, ResourceId, Stamp, Trace, WorkerId};

use crate::error::RegistryError;

#[derive(Debug)]
struct ResourceSlot {
    name: String,
    holder: Option<WorkerId>,
    events: Vec<AccessEvent>,
}

#[derive(Debug, Default)]
struct RegistryState {
    slots: Vec<ResourceSlot>,
    by_name: HashMap<String, ResourceId>,
    trace: Trace,
}

impl RegistryState {
    fn slot_mut(&mut self, resource: ResourceId) -> Result<&mut ResourceSlot, RegistryError> {
        self.slots
            .get_mut(resource.index())
            .ok_or(RegistryError::UnknownResource(resource))
    }
}

/// Registry of named shared resources and the accesses made to them.
pub struct ResourceRegistry {
    state: Mutex<RegistryState>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resources", &self.names())
            .finish()
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
        }
    }

    #[cfg(not(loom))]
    fn with_state<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        f(&mut self.state.lock())
    }

    #[cfg(loom)]
    fn with_state<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Register a resource under a unique name.
    pub fn register(&self, name: &str) -> Result<ResourceId, RegistryError> {
        self.with_state(|state| {
            if state.by_name.contains_key(name) {
                return Err(RegistryError::DuplicateResource(name.to_string()));
            }
            let id = ResourceId(state.slots.len() as u32);
            state.slots.push(ResourceSlot {
                name: name.to_string(),
                holder: None,
                events: Vec::new(),
            });
            state.by_name.insert(name.to_string(), id);
            Ok(id)
        })
    }

    pub fn lookup(&self, name: &str) -> Option<ResourceId> {
        self.with_state(|state| state.by_name.get(name).copied())
    }

    pub fn name(&self, resource: ResourceId) -> Option<String> {
        self.with_state(|state| state.slots.get(resource.index()).map(|s| s.name.clone()))
    }

    /// Names indexed by `ResourceId`.
    pub fn names(&self) -> Vec<String> {
        self.with_state(|state| state.slots.iter().map(|s| s.name.clone()).collect())
    }

    pub fn len(&self) -> usize {
        self.with_state(|state| state.slots.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current lock holder of `resource`, if any.
    pub fn holder(&self, resource: ResourceId) -> Result<Option<WorkerId>, RegistryError> {
        self.with_state(|state| Ok(state.slot_mut(resource)?.holder))
    }

    /// Record one access and apply its lock semantics.
    ///
    /// - `Acquire` on a free resource takes it (`Granted`).
    /// - `Acquire` on a resource held by another worker is logged as
    ///   `Blocked` and changes nothing; the caller retries later.
    /// - `Release` frees the resource; only the holder may release.
    /// - `Read`/`Write` are logged as `Granted` with no checks: catching
    ///   unsynchronized data access is the detector's job.
    ///
    /// Errors leave the registry unchanged and log nothing.
    pub fn record_access(
        &self,
        resource: ResourceId,
        worker: WorkerId,
        op: OpKind,
        stamp: Stamp,
    ) -> Result<AccessEvent, RegistryError> {
        self.with_state(|state| {
            let seq = state.trace.len() as u64;
            let slot = state.slot_mut(resource)?;

            let status = match op {
                OpKind::Acquire => match slot.holder {
                    None => {
                        slot.holder = Some(worker);
                        AccessStatus::Granted
                    }
                    Some(holder) if holder == worker => {
                        return Err(RegistryError::Reentrant { resource, worker });
                    }
                    Some(_) => AccessStatus::Blocked,
                },
                OpKind::Release => {
                    if slot.holder != Some(worker) {
                        return Err(RegistryError::NotHolder { resource, worker });
                    }
                    slot.holder = None;
                    AccessStatus::Granted
                }
                OpKind::Read | OpKind::Write => AccessStatus::Granted,
            };

            let event = AccessEvent {
                seq,
                resource,
                worker,
                op,
                status,
                timestamp: stamp.timestamp,
                delay: stamp.delay,
            };
            slot.events.push(event.clone());
            state.trace.push(event.clone());
            Ok(event)
        })
    }

    /// Every recorded access, in commit order.
    pub fn trace(&self) -> Trace {
        self.with_state(|state| state.trace.clone())
    }

    /// Accesses made to one resource, in commit order.
    pub fn events(&self, resource: ResourceId) -> Result<Vec<AccessEvent>, RegistryError> {
        self.with_state(|state| Ok(state.slot_mut(resource)?.events.clone()))
    }

    /// Clear holders and logs. Registered names and ids are kept.
    pub fn reset(&self) {
        self.with_state(|state| {
            for slot in &mut state.slots {
                slot.holder = None;
                slot.events.clear();
            }
            state.trace.clear();
        })
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn at(timestamp: u64) -> Stamp {
        Stamp {
            timestamp,
            delay: 0,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ResourceRegistry::new();
        let a = registry.register("a").unwrap();
        let b = registry.register("b").unwrap();
        assert_eq!(a, ResourceId(0));
        assert_eq!(b, ResourceId(1));
        assert_eq!(registry.lookup("b"), Some(b));
        assert_eq!(registry.lookup("c"), None);
        assert_eq!(registry.name(a).as_deref(), Some("a"));
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = ResourceRegistry::new();
        registry.register("lock").unwrap();
        assert_eq!(
            registry.register("lock"),
            Err(RegistryError::DuplicateResource("lock".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_acquire_blocked_release() {
        let registry = ResourceRegistry::new();
        let lock = registry.register("lock").unwrap();

        let first = registry
            .record_access(lock, WorkerId(0), OpKind::Acquire, at(0))
            .unwrap();
        assert_eq!(first.status, AccessStatus::Granted);
        assert_eq!(registry.holder(lock).unwrap(), Some(WorkerId(0)));

        let second = registry
            .record_access(lock, WorkerId(1), OpKind::Acquire, at(1))
            .unwrap();
        assert_eq!(second.status, AccessStatus::Blocked);
        assert_eq!(registry.holder(lock).unwrap(), Some(WorkerId(0)));

        registry
            .record_access(lock, WorkerId(0), OpKind::Release, at(2))
            .unwrap();
        assert_eq!(registry.holder(lock).unwrap(), None);

        let trace = registry.trace();
        assert_eq!(trace.len(), 3);
        assert_eq!(
            trace.iter().map(|e| e.seq).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_release_by_non_holder() {
        let registry = ResourceRegistry::new();
        let lock = registry.register("lock").unwrap();
        registry
            .record_access(lock, WorkerId(0), OpKind::Acquire, at(0))
            .unwrap();

        let err = registry
            .record_access(lock, WorkerId(1), OpKind::Release, at(1))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::NotHolder {
                resource: lock,
                worker: WorkerId(1)
            }
        );
        // Failed accesses are not logged.
        assert_eq!(registry.trace().len(), 1);
        assert_eq!(registry.holder(lock).unwrap(), Some(WorkerId(0)));
    }

    #[test]
    fn test_reentrant_acquire() {
        let registry = ResourceRegistry::new();
        let lock = registry.register("lock").unwrap();
        registry
            .record_access(lock, WorkerId(0), OpKind::Acquire, at(0))
            .unwrap();
        assert!(matches!(
            registry.record_access(lock, WorkerId(0), OpKind::Acquire, at(1)),
            Err(RegistryError::Reentrant { .. })
        ));
    }

    #[test]
    fn test_unknown_resource() {
        let registry = ResourceRegistry::new();
        assert_eq!(
            registry.record_access(ResourceId(3), WorkerId(0), OpKind::Read, at(0)),
            Err(RegistryError::UnknownResource(ResourceId(3)))
        );
        assert!(registry.holder(ResourceId(3)).is_err());
    }

    #[test]
    fn test_per_resource_events() {
        let registry = ResourceRegistry::new();
        let x = registry.register("x").unwrap();
        let y = registry.register("y").unwrap();
        registry.record_access(x, WorkerId(0), OpKind::Read, at(0)).unwrap();
        registry.record_access(y, WorkerId(1), OpKind::Write, at(1)).unwrap();
        registry.record_access(x, WorkerId(1), OpKind::Write, at(2)).unwrap();

        let x_events = registry.events(x).unwrap();
        assert_eq!(x_events.len(), 2);
        assert!(x_events.iter().all(|e| e.resource == x));
        assert_eq!(x_events[1].seq, 2);
    }

    #[test]
    fn test_reset_keeps_names() {
        let registry = ResourceRegistry::new();
        let lock = registry.register("lock").unwrap();
        registry
            .record_access(lock, WorkerId(0), OpKind::Acquire, at(0))
            .unwrap();
        registry.reset();

        assert!(registry.trace().is_empty());
        assert_eq!(registry.holder(lock).unwrap(), None);
        assert_eq!(registry.lookup("lock"), Some(lock));

        let event = registry
            .record_access(lock, WorkerId(1), OpKind::Acquire, at(0))
            .unwrap();
        assert_eq!(event.seq, 0);
        assert_eq!(event.status, AccessStatus::Granted);
    }

    #[test]
    fn test_concurrent_recording_is_serialized() {
        const THREADS: u32 = 4;
        const ACCESSES: u64 = 250;

        let registry = Arc::new(ResourceRegistry::new());
        let cell = registry.register("cell").unwrap();

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..ACCESSES {
                        registry
                            .record_access(cell, WorkerId(t), OpKind::Write, at(i))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let trace = registry.trace();
        assert_eq!(trace.len() as u64, THREADS as u64 * ACCESSES);
        for (i, event) in trace.iter().enumerate() {
            assert_eq!(event.seq, i as u64);
        }
    }
}

#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn test_lock_has_single_holder() {
        loom::model(|| {
            let registry = Arc::new(ResourceRegistry::new());
            let lock = registry.register("lock").unwrap();

            let r1 = Arc::clone(&registry);
            let r2 = Arc::clone(&registry);

            let t1 = thread::spawn(move || {
                r1.record_access(lock, WorkerId(0), OpKind::Acquire, Stamp::default())
                    .unwrap()
                    .status
            });
            let t2 = thread::spawn(move || {
                r2.record_access(lock, WorkerId(1), OpKind::Acquire, Stamp::default())
                    .unwrap()
                    .status
            });

            let s1 = t1.join().unwrap();
            let s2 = t2.join().unwrap();

            let granted = [s1, s2]
                .iter()
                .filter(|s| **s == AccessStatus::Granted)
                .count();
            assert_eq!(granted, 1);
            assert_eq!(registry.trace().len(), 2);
        });
    }
}
