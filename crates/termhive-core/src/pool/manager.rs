//! The Session Pool: which sessions are materialized and which are dormant.

use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info, warn};

use super::errors::{InstanceError, PoolError};
use super::eviction::{EvictionPass, ReconcileReport, select_candidate};
use super::instance::{LiveInstance, RestoredSession, cleanup_isolated};
use super::port::SupervisorPort;
use crate::config::{MAX_POOL_SIZE, MIN_POOL_SIZE};
use crate::daemon::SupervisorError;
use crate::protocol::SessionInfo;
use crate::sessions::{LifecycleState, Session, SessionId, SessionRegistry};

/// Builds a live instance for a session coming out of dormancy.
pub type Mount<'a, T> =
    dyn FnOnce(RestoredSession<T>) -> Result<Box<dyn LiveInstance>, InstanceError> + 'a;

/// Tracks recency, live instances and dormant snapshots for every session
/// the UI knows about.
///
/// A session is live iff it has an entry in `instances` and dormant iff it
/// has a snapshot in `dormant`. Never both.
pub struct SessionPool<S: SupervisorPort> {
    supervisor: S,
    /// Most recently touched first.
    lru: Vec<SessionId>,
    max_size: usize,
    instances: HashMap<SessionId, Box<dyn LiveInstance>>,
    dormant: HashMap<SessionId, Vec<u8>>,
}

impl<S: SupervisorPort> SessionPool<S> {
    pub fn new(supervisor: S, max_size: usize) -> Self {
        Self {
            supervisor,
            lru: Vec::new(),
            max_size: clamp_size(max_size),
            instances: HashMap::new(),
            dormant: HashMap::new(),
        }
    }

    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut S {
        &mut self.supervisor
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn active_live_count(&self) -> usize {
        self.instances.len()
    }

    pub fn needs_eviction(&self) -> bool {
        self.active_live_count() > self.max_size
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    pub fn is_dormant(&self, id: &str) -> bool {
        self.dormant.contains_key(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.is_live(id) || self.is_dormant(id) || self.lru.iter().any(|s| s == id)
    }

    pub fn lru_order(&self) -> &[SessionId] {
        &self.lru
    }

    /// Live sessions, most recently touched first.
    pub fn live_ids(&self) -> Vec<SessionId> {
        self.lru
            .iter()
            .filter(|id| self.instances.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn dormant_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.dormant.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn snapshot_of(&self, id: &str) -> Option<&[u8]> {
        self.dormant.get(id).map(Vec::as_slice)
    }

    pub fn instance(&self, id: &str) -> Option<&dyn LiveInstance> {
        self.instances.get(id).map(|i| i.as_ref())
    }

    /// Attach the live instance for a newly materialized session.
    pub fn register(
        &mut self,
        id: &str,
        mut instance: Box<dyn LiveInstance>,
    ) -> Result<(), PoolError> {
        if self.instances.contains_key(id) {
            cleanup_isolated(id, instance.as_mut());
            return Err(PoolError::AlreadyLive { id: id.to_string() });
        }
        if self.dormant.contains_key(id) {
            cleanup_isolated(id, instance.as_mut());
            return Err(PoolError::AlreadyDormant { id: id.to_string() });
        }

        self.instances.insert(id.to_string(), instance);
        self.touch(id);
        debug!(event = "core.pool.instance_registered", session_id = id);
        Ok(())
    }

    /// Move `id` to the front of the recency order.
    pub fn touch(&mut self, id: &str) {
        if self.lru.first().is_some_and(|front| front == id) {
            return;
        }
        self.lru.retain(|s| s != id);
        self.lru.insert(0, id.to_string());
    }

    pub fn eviction_candidate(
        &self,
        registry: &SessionRegistry,
        active: Option<&str>,
        pinned: &HashSet<SessionId>,
    ) -> Option<SessionId> {
        self.candidate_excluding(registry, active, pinned, &HashSet::new())
    }

    fn candidate_excluding(
        &self,
        registry: &SessionRegistry,
        active: Option<&str>,
        pinned: &HashSet<SessionId>,
        excluded: &HashSet<SessionId>,
    ) -> Option<SessionId> {
        let live = self.lru.iter().filter(|id| self.instances.contains_key(*id));
        let live: Vec<&SessionId> = live.collect();
        select_candidate(live.into_iter(), registry, active, pinned, excluded)
    }

    /// Make a live session dormant.
    ///
    /// Serialization or supervisor failure aborts with nothing changed.
    /// Cleanup failure is logged and the eviction still counts.
    pub fn evict(&mut self, id: &str) -> Result<(), PoolError> {
        let Some(instance) = self.instances.get(id) else {
            return Err(PoolError::NotLive { id: id.to_string() });
        };

        info!(event = "core.pool.evict_started", session_id = id);

        let snapshot = instance.serialize().map_err(|source| {
            warn!(
                event = "core.pool.evict_aborted",
                session_id = id,
                reason = "serialize",
                error = %source,
            );
            PoolError::SerializationFailed {
                id: id.to_string(),
                source,
            }
        })?;

        if let Err(e) = self.supervisor.begin_buffering(id) {
            warn!(
                event = "core.pool.evict_aborted",
                session_id = id,
                reason = "supervisor",
                error = %e,
            );
            return Err(e.into());
        }

        self.commit_dormant(id, snapshot);
        Ok(())
    }

    fn commit_dormant(&mut self, id: &str, snapshot: Vec<u8>) {
        let snapshot_bytes = snapshot.len();
        self.dormant.insert(id.to_string(), snapshot);
        if let Some(mut instance) = self.instances.remove(id) {
            cleanup_isolated(id, instance.as_mut());
        }

        info!(
            event = "core.pool.evict_completed",
            session_id = id,
            snapshot_bytes = snapshot_bytes,
        );
    }

    /// Bring a dormant session back.
    ///
    /// The supervisor subscribes the returned stream before flushing, so
    /// `mount` sees the snapshot, then the flushed bytes, then live output.
    pub fn restore(&mut self, id: &str, mount: Box<Mount<'_, S::Stream>>) -> Result<(), PoolError> {
        if !self.dormant.contains_key(id) {
            return Err(PoolError::NotDormant { id: id.to_string() });
        }

        info!(event = "core.pool.restore_started", session_id = id);

        let restoration = self.supervisor.restore(id).map_err(|e| {
            error!(
                event = "core.pool.restore_failed",
                session_id = id,
                reason = "supervisor",
                error = %e,
            );
            PoolError::Supervisor(e)
        })?;

        let snapshot = self.dormant.remove(id).unwrap_or_default();
        let mut preserved = snapshot.clone();
        preserved.extend_from_slice(&restoration.flushed);
        let flushed_bytes = restoration.flushed.len();

        let restored = RestoredSession {
            id: id.to_string(),
            snapshot,
            flushed: restoration.flushed,
            stream: restoration.stream,
        };

        match mount(restored) {
            Ok(instance) => {
                self.instances.insert(id.to_string(), instance);
                self.touch(id);
                info!(
                    event = "core.pool.restore_completed",
                    session_id = id,
                    flushed_bytes = flushed_bytes,
                );
                Ok(())
            }
            Err(source) => {
                // Keep what was flushed and go back to buffering.
                self.dormant.insert(id.to_string(), preserved);
                if let Err(e) = self.supervisor.begin_buffering(id) {
                    error!(
                        event = "core.pool.rebuffer_failed",
                        session_id = id,
                        error = %e,
                    );
                }
                error!(
                    event = "core.pool.restore_failed",
                    session_id = id,
                    reason = "mount",
                    error = %source,
                );
                Err(PoolError::MountFailed {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }

    /// Evict until within capacity or out of candidates.
    ///
    /// Bounded by the live count at the start of the pass.
    pub fn enforce_capacity(
        &mut self,
        registry: &SessionRegistry,
        active: Option<&str>,
        pinned: &HashSet<SessionId>,
    ) -> EvictionPass {
        let ceiling = self.active_live_count();
        self.eviction_pass(registry, active, pinned, ceiling)
    }

    fn eviction_pass(
        &mut self,
        registry: &SessionRegistry,
        active: Option<&str>,
        pinned: &HashSet<SessionId>,
        ceiling: usize,
    ) -> EvictionPass {
        let mut pass = EvictionPass::default();
        let mut skipped: HashSet<SessionId> = HashSet::new();

        while self.needs_eviction() {
            if pass.iterations >= ceiling {
                pass.runaway = true;
                warn!(
                    event = "core.pool.eviction_runaway",
                    iterations = pass.iterations,
                    live = self.active_live_count(),
                    max_size = self.max_size,
                );
                break;
            }
            pass.iterations += 1;

            let Some(candidate) = self.candidate_excluding(registry, active, pinned, &skipped)
            else {
                pass.deferred = true;
                info!(
                    event = "core.pool.eviction_deferred",
                    live = self.active_live_count(),
                    max_size = self.max_size,
                );
                break;
            };

            match self.evict(&candidate) {
                Ok(()) => pass.evicted.push(candidate),
                Err(PoolError::SerializationFailed { .. }) => {
                    pass.failed.push(candidate.clone());
                    skipped.insert(candidate);
                }
                Err(e) => {
                    // Supervisor trouble affects every candidate alike.
                    error!(
                        event = "core.pool.eviction_pass_aborted",
                        session_id = candidate,
                        error = %e,
                    );
                    pass.failed.push(candidate);
                    break;
                }
            }
        }

        if !pass.is_noop() {
            info!(
                event = "core.pool.eviction_pass_completed",
                evicted = pass.evicted.len(),
                iterations = pass.iterations,
                runaway = pass.runaway,
                deferred = pass.deferred,
            );
        }
        pass
    }

    /// Change capacity, clamped to the allowed range, evicting in one pass.
    ///
    /// Bounded by the previous capacity.
    pub fn resize(
        &mut self,
        new_max_size: usize,
        registry: &SessionRegistry,
        active: Option<&str>,
        pinned: &HashSet<SessionId>,
    ) -> EvictionPass {
        let previous = self.max_size;
        self.max_size = clamp_size(new_max_size);
        info!(
            event = "core.pool.resized",
            previous = previous,
            max_size = self.max_size,
        );
        self.eviction_pass(registry, active, pinned, previous)
    }

    /// Focus `id`: restore it if dormant, touch it, then honor capacity.
    pub fn switch_to(
        &mut self,
        id: &str,
        registry: &SessionRegistry,
        pinned: &HashSet<SessionId>,
        mount: Box<Mount<'_, S::Stream>>,
    ) -> Result<EvictionPass, PoolError> {
        if self.is_dormant(id) {
            self.restore(id, mount)?;
        } else if !self.is_live(id) {
            return Err(PoolError::NotFound { id: id.to_string() });
        }

        self.touch(id);
        Ok(self.enforce_capacity(registry, Some(id), pinned))
    }

    /// Forget `id` entirely. Safe on unknown ids and when repeated.
    pub fn remove(&mut self, id: &str) {
        self.lru.retain(|s| s != id);
        self.dormant.remove(id);
        if let Some(mut instance) = self.instances.remove(id) {
            cleanup_isolated(id, instance.as_mut());
        }
    }

    /// Close through the supervisor and drop all local state.
    ///
    /// Local state is released even when the supervisor cannot be reached.
    pub fn close(&mut self, id: &str, registry: &mut SessionRegistry) -> Result<(), PoolError> {
        let result = match self.supervisor.close(id) {
            Err(SupervisorError::SessionNotFound { .. }) => Ok(()),
            other => other,
        };

        self.remove(id);
        registry.remove(id);

        match result {
            Ok(()) => {
                info!(event = "core.pool.close_completed", session_id = id);
                Ok(())
            }
            Err(e) => {
                warn!(
                    event = "core.pool.close_failed",
                    session_id = id,
                    error = %e,
                );
                Err(e.into())
            }
        }
    }

    /// Mirror a supervisor state change into the registry.
    pub fn handle_state_change(
        &mut self,
        registry: &mut SessionRegistry,
        id: &str,
        state: LifecycleState,
    ) {
        if let Err(e) = registry.set_state(id, state) {
            // The supervisor is authoritative; take its state anyway.
            if let Some(mut session) = registry.get(id).cloned() {
                warn!(
                    event = "core.pool.state_forced",
                    session_id = id,
                    state = %state,
                    error = %e,
                );
                session.state = state;
                registry.upsert(session);
            }
        }
    }

    /// The PTY exited: mark stopped, then drop every trace of the session.
    ///
    /// Returns the final registry record, in state `stopped`.
    pub fn handle_exit(
        &mut self,
        registry: &mut SessionRegistry,
        id: &str,
        exit_code: Option<i32>,
    ) -> Option<Session> {
        self.handle_state_change(registry, id, LifecycleState::Stopped);
        let was_dormant = self.is_dormant(id);
        self.remove(id);
        let session = registry.remove(id);

        info!(
            event = "core.pool.session_exited",
            session_id = id,
            exit_code = exit_code,
            was_dormant = was_dormant,
        );
        session
    }

    /// Repair drift against the supervisor's view after a reconnect.
    pub fn reconcile(
        &mut self,
        view: &[SessionInfo],
        registry: &mut SessionRegistry,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let known: HashMap<&str, &SessionInfo> =
            view.iter().map(|info| (info.id.as_str(), info)).collect();

        let mut held: Vec<SessionId> = self
            .lru
            .iter()
            .chain(self.instances.keys())
            .chain(self.dormant.keys())
            .cloned()
            .collect();
        held.sort();
        held.dedup();

        for id in held {
            let Some(info) = known.get(id.as_str()) else {
                self.remove(&id);
                registry.remove(&id);
                report.dropped.push(id);
                continue;
            };

            if self.is_dormant(&id) && !info.dormant {
                match self.supervisor.begin_buffering(&id) {
                    Ok(()) => report.rebuffered.push(id),
                    Err(e) => {
                        warn!(
                            event = "core.pool.reconcile_rebuffer_failed",
                            session_id = id,
                            error = %e,
                        );
                        report.unresolved.push(id);
                    }
                }
            } else if self.is_live(&id) && info.dormant {
                let snapshot = self.instances.get(&id).map(|i| i.serialize());
                match snapshot {
                    Some(Ok(snapshot)) => {
                        self.commit_dormant(&id, snapshot);
                        report.completed.push(id);
                    }
                    Some(Err(e)) => {
                        warn!(
                            event = "core.pool.reconcile_complete_failed",
                            session_id = id,
                            error = %e,
                        );
                        report.unresolved.push(id);
                    }
                    None => {}
                }
            }
        }

        // Mirror entries the pool never materialized.
        for id in registry.ids() {
            if !known.contains_key(id.as_str()) {
                registry.remove(&id);
                report.dropped.push(id);
            }
        }

        for info in view {
            registry.upsert(info.to_session());
        }

        info!(
            event = "core.pool.reconcile_completed",
            dropped = report.dropped.len(),
            rebuffered = report.rebuffered.len(),
            completed = report.completed.len(),
            unresolved = report.unresolved.len(),
        );
        report
    }
}

impl<S: SupervisorPort> Drop for SessionPool<S> {
    fn drop(&mut self) {
        for (id, instance) in self.instances.iter_mut() {
            cleanup_isolated(id, instance.as_mut());
        }
    }
}

fn clamp_size(size: usize) -> usize {
    size.clamp(MIN_POOL_SIZE, MAX_POOL_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::port::Restoration;
    use crate::sessions::SessionKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Calls {
        buffering: Vec<String>,
        restored: Vec<String>,
        closed: Vec<String>,
        cleanups: Vec<String>,
    }

    struct FakeSupervisor {
        calls: Rc<RefCell<Calls>>,
        flush: Vec<u8>,
        fail_buffering: bool,
        fail_close: bool,
    }

    impl SupervisorPort for FakeSupervisor {
        type Stream = ();

        fn begin_buffering(&mut self, id: &str) -> Result<(), SupervisorError> {
            if self.fail_buffering {
                return Err(SupervisorError::ConnectionFailed {
                    message: "socket closed".to_string(),
                });
            }
            self.calls.borrow_mut().buffering.push(id.to_string());
            Ok(())
        }

        fn restore(&mut self, id: &str) -> Result<Restoration<()>, SupervisorError> {
            self.calls.borrow_mut().restored.push(id.to_string());
            Ok(Restoration {
                flushed: std::mem::take(&mut self.flush),
                stream: (),
            })
        }

        fn close(&mut self, id: &str) -> Result<(), SupervisorError> {
            self.calls.borrow_mut().closed.push(id.to_string());
            if self.fail_close {
                return Err(SupervisorError::NotRunning {
                    path: "/tmp/none.sock".to_string(),
                });
            }
            Ok(())
        }
    }

    struct FakeInstance {
        id: String,
        screen: Vec<u8>,
        fail_serialize: bool,
        calls: Rc<RefCell<Calls>>,
    }

    impl LiveInstance for FakeInstance {
        fn serialize(&self) -> Result<Vec<u8>, InstanceError> {
            if self.fail_serialize {
                return Err(InstanceError::Serialize {
                    message: "detached".to_string(),
                });
            }
            Ok(self.screen.clone())
        }

        fn cleanup(&mut self) -> Result<(), InstanceError> {
            self.calls.borrow_mut().cleanups.push(self.id.clone());
            Err(InstanceError::Cleanup {
                message: "already gone".to_string(),
            })
        }
    }

    struct Fixture {
        pool: SessionPool<FakeSupervisor>,
        registry: SessionRegistry,
        calls: Rc<RefCell<Calls>>,
    }

    impl Fixture {
        fn new(max_size: usize) -> Self {
            let calls = Rc::new(RefCell::new(Calls::default()));
            let supervisor = FakeSupervisor {
                calls: Rc::clone(&calls),
                flush: Vec::new(),
                fail_buffering: false,
                fail_close: false,
            };
            Self {
                pool: SessionPool::new(supervisor, max_size),
                registry: SessionRegistry::new(),
                calls,
            }
        }

        fn open(&mut self, state: LifecycleState) -> String {
            let id = self
                .registry
                .create("webapp", Some("main"), SessionKind::InteractiveAgent)
                .unwrap();
            self.registry.set_state(&id, LifecycleState::Busy).unwrap();
            self.registry.set_state(&id, state).unwrap();
            let instance = self.instance(&id, false);
            self.pool.register(&id, instance).unwrap();
            id
        }

        fn instance(&self, id: &str, fail_serialize: bool) -> Box<dyn LiveInstance> {
            Box::new(FakeInstance {
                id: id.to_string(),
                screen: format!("screen of {}\n", id).into_bytes(),
                fail_serialize,
                calls: Rc::clone(&self.calls),
            })
        }
    }

    fn remount(calls: Rc<RefCell<Calls>>) -> Box<Mount<'static, ()>> {
        Box::new(
            move |restored: RestoredSession<()>| -> Result<Box<dyn LiveInstance>, InstanceError> {
                let screen = restored.replay_bytes();
                Ok(Box::new(FakeInstance {
                    id: restored.id,
                    screen,
                    fail_serialize: false,
                    calls,
                }))
            },
        )
    }

    #[test]
    fn test_max_size_is_clamped() {
        assert_eq!(Fixture::new(1).pool.max_size(), 2);
        assert_eq!(Fixture::new(50).pool.max_size(), 20);
    }

    #[test]
    fn test_touch_moves_to_front() {
        let mut f = Fixture::new(5);
        f.pool.touch("a");
        f.pool.touch("b");
        f.pool.touch("a");
        assert_eq!(f.pool.lru_order(), ["a", "b"]);
        f.pool.touch("a");
        assert_eq!(f.pool.lru_order(), ["a", "b"]);
    }

    #[test]
    fn test_register_rejects_second_instance() {
        let mut f = Fixture::new(5);
        let id = f.open(LifecycleState::Done);
        let dup = f.instance(&id, false);
        let err = f.pool.register(&id, dup).unwrap_err();
        assert!(matches!(err, PoolError::AlreadyLive { .. }));
        assert_eq!(f.pool.active_live_count(), 1);
        assert_eq!(f.calls.borrow().cleanups, vec![id]);
    }

    #[test]
    fn test_evict_commits_despite_cleanup_failure() {
        let mut f = Fixture::new(5);
        let id = f.open(LifecycleState::Done);
        f.pool.evict(&id).unwrap();

        assert!(f.pool.is_dormant(&id));
        assert!(!f.pool.is_live(&id));
        assert_eq!(
            f.pool.snapshot_of(&id).unwrap(),
            format!("screen of {}\n", id).as_bytes()
        );
        assert_eq!(f.calls.borrow().buffering, vec![id.clone()]);
        assert_eq!(f.calls.borrow().cleanups, vec![id]);
    }

    #[test]
    fn test_serialize_failure_aborts_without_mutation() {
        let mut f = Fixture::new(5);
        let id = f
            .registry
            .create("webapp", None, SessionKind::PlainShell)
            .unwrap();
        let broken = f.instance(&id, true);
        f.pool.register(&id, broken).unwrap();

        let err = f.pool.evict(&id).unwrap_err();
        assert!(matches!(err, PoolError::SerializationFailed { .. }));
        assert!(f.pool.is_live(&id));
        assert!(!f.pool.is_dormant(&id));
        assert!(f.calls.borrow().buffering.is_empty());
        assert!(f.calls.borrow().cleanups.is_empty());
    }

    #[test]
    fn test_supervisor_failure_aborts_without_mutation() {
        let mut f = Fixture::new(5);
        let id = f.open(LifecycleState::Done);
        f.pool.supervisor_mut().fail_buffering = true;

        let err = f.pool.evict(&id).unwrap_err();
        assert!(matches!(err, PoolError::Supervisor(_)));
        assert!(f.pool.is_live(&id));
        assert!(f.calls.borrow().cleanups.is_empty());
    }

    #[test]
    fn test_restore_mounts_snapshot_then_flushed() {
        let mut f = Fixture::new(5);
        let id = f.open(LifecycleState::Done);
        f.pool.evict(&id).unwrap();
        f.pool.supervisor_mut().flush = b"while away\n".to_vec();

        f.pool.restore(&id, remount(Rc::clone(&f.calls))).unwrap();

        assert!(f.pool.is_live(&id));
        assert!(!f.pool.is_dormant(&id));
        let screen = f.pool.instance(&id).unwrap().serialize().unwrap();
        assert_eq!(screen, format!("screen of {}\nwhile away\n", id).into_bytes());
        assert_eq!(f.pool.lru_order()[0], id);
    }

    #[test]
    fn test_restore_mount_failure_keeps_session_dormant() {
        let mut f = Fixture::new(5);
        let id = f.open(LifecycleState::Done);
        f.pool.evict(&id).unwrap();
        f.pool.supervisor_mut().flush = b"tail\n".to_vec();

        let failing: Box<Mount<'static, ()>> = Box::new(
            |_: RestoredSession<()>| -> Result<Box<dyn LiveInstance>, InstanceError> {
                Err(InstanceError::Mount {
                    message: "no renderer".to_string(),
                })
            },
        );
        let err = f.pool.restore(&id, failing).unwrap_err();

        assert!(matches!(err, PoolError::MountFailed { .. }));
        assert!(f.pool.is_dormant(&id));
        assert!(f.pool.snapshot_of(&id).unwrap().ends_with(b"tail\n"));
        assert_eq!(f.calls.borrow().buffering, vec![id.clone(), id]);
    }

    #[test]
    fn test_restore_rejects_live_session() {
        let mut f = Fixture::new(5);
        let id = f.open(LifecycleState::Done);
        let err = f.pool.restore(&id, remount(Rc::clone(&f.calls))).unwrap_err();
        assert!(matches!(err, PoolError::NotDormant { .. }));
        assert!(f.calls.borrow().restored.is_empty());
    }

    #[test]
    fn test_enforce_capacity_skips_failed_serialization() {
        let mut f = Fixture::new(2);
        let broken = f
            .registry
            .create("webapp", None, SessionKind::PlainShell)
            .unwrap();
        let instance = f.instance(&broken, true);
        f.pool.register(&broken, instance).unwrap();
        let b = f.open(LifecycleState::Done);
        let c = f.open(LifecycleState::Done);

        let pass = f.pool.enforce_capacity(&f.registry, Some(&c), &HashSet::new());

        assert_eq!(pass.failed, vec![broken.clone()]);
        assert_eq!(pass.evicted, vec![b]);
        assert!(!f.pool.needs_eviction());
        assert!(f.pool.is_live(&broken));
    }

    #[test]
    fn test_enforce_capacity_defers_when_everything_protected() {
        let mut f = Fixture::new(2);
        for _ in 0..4 {
            f.open(LifecycleState::Busy);
        }
        let pass = f.pool.enforce_capacity(&f.registry, None, &HashSet::new());
        assert!(pass.deferred);
        assert!(pass.evicted.is_empty());
        assert_eq!(f.pool.active_live_count(), 4);
    }

    #[test]
    fn test_switch_to_dormant_restores_and_evicts_other() {
        let mut f = Fixture::new(2);
        let a = f.open(LifecycleState::Done);
        let b = f.open(LifecycleState::Done);
        f.pool.evict(&a).unwrap();
        let c = f.open(LifecycleState::Done);

        let mount = remount(Rc::clone(&f.calls));
        let pass = f
            .pool
            .switch_to(&a, &f.registry, &HashSet::new(), mount)
            .unwrap();

        assert_eq!(pass.evicted, vec![b.clone()]);
        assert!(f.pool.is_live(&a));
        assert!(f.pool.is_live(&c));
        assert!(f.pool.is_dormant(&b));
    }

    #[test]
    fn test_switch_to_unknown_session() {
        let mut f = Fixture::new(2);
        let mount = remount(Rc::clone(&f.calls));
        let err = f
            .pool
            .switch_to("nope", &f.registry, &HashSet::new(), mount)
            .unwrap_err();
        assert!(matches!(err, PoolError::NotFound { .. }));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut f = Fixture::new(5);
        let id = f.open(LifecycleState::Done);
        f.pool.evict(&id).unwrap();
        f.pool.remove(&id);
        f.pool.remove(&id);
        f.pool.remove("never-seen");
        assert!(!f.pool.contains(&id));
        assert!(f.pool.snapshot_of(&id).is_none());
        assert!(f.pool.lru_order().is_empty());
    }

    #[test]
    fn test_close_releases_local_state_when_supervisor_unreachable() {
        let mut f = Fixture::new(5);
        let id = f.open(LifecycleState::Done);
        f.pool.supervisor_mut().fail_close = true;

        let err = f.pool.close(&id, &mut f.registry).unwrap_err();
        assert!(matches!(
            err,
            PoolError::Supervisor(SupervisorError::NotRunning { .. })
        ));
        assert!(!f.pool.contains(&id));
        assert!(f.registry.get(&id).is_none());
    }

    #[test]
    fn test_handle_exit_while_dormant_removes_everything() {
        let mut f = Fixture::new(5);
        let id = f.open(LifecycleState::Done);
        f.pool.evict(&id).unwrap();

        let session = f.pool.handle_exit(&mut f.registry, &id, Some(0)).unwrap();

        assert_eq!(session.state, LifecycleState::Stopped);
        assert!(!f.pool.contains(&id));
        assert!(f.registry.get(&id).is_none());
    }

    #[test]
    fn test_handle_state_change_forces_supervisor_state() {
        let mut f = Fixture::new(5);
        let id = f.open(LifecycleState::Done);
        // done -> question is not a valid transition, but the supervisor wins
        f.pool
            .handle_state_change(&mut f.registry, &id, LifecycleState::Question);
        assert_eq!(f.registry.state_of(&id), Some(LifecycleState::Question));
    }

    fn info_for(f: &Fixture, id: &str, dormant: bool) -> SessionInfo {
        let session = f.registry.get(id).unwrap();
        SessionInfo {
            id: session.id.clone(),
            project_id: session.project_id.clone(),
            worktree_id: session.worktree_id.clone(),
            kind: session.kind,
            state: session.state,
            title: session.title.clone(),
            last_activity: session.last_activity,
            created_at: session.last_activity,
            pid: None,
            dormant,
            buffered_bytes: 0,
            client_count: 0,
        }
    }

    #[test]
    fn test_reconcile_repairs_drift() {
        let mut f = Fixture::new(5);
        let gone = f.open(LifecycleState::Done);
        let lost_ack = f.open(LifecycleState::Done);
        let half_evicted = f.open(LifecycleState::Done);
        let healthy = f.open(LifecycleState::Done);
        f.pool.evict(&lost_ack).unwrap();

        let view = vec![
            info_for(&f, &lost_ack, false),
            info_for(&f, &half_evicted, true),
            info_for(&f, &healthy, false),
        ];
        let report = f.pool.reconcile(&view, &mut f.registry);

        assert_eq!(report.dropped, vec![gone.clone()]);
        assert_eq!(report.rebuffered, vec![lost_ack.clone()]);
        assert_eq!(report.completed, vec![half_evicted.clone()]);
        assert!(report.unresolved.is_empty());
        assert!(!f.pool.contains(&gone));
        assert!(f.registry.get(&gone).is_none());
        assert!(f.pool.is_dormant(&half_evicted));
        assert!(f.pool.is_live(&healthy));
    }

    #[test]
    fn test_reconcile_drops_unmaterialized_mirror_entries() {
        let mut f = Fixture::new(5);
        let kept = f.open(LifecycleState::Done);
        let exited_unseen = f
            .registry
            .create("webapp", None, SessionKind::PlainShell)
            .unwrap();

        let view = vec![info_for(&f, &kept, false)];
        let report = f.pool.reconcile(&view, &mut f.registry);

        assert_eq!(report.dropped, vec![exited_unseen.clone()]);
        assert!(f.registry.get(&exited_unseen).is_none());
        assert!(f.registry.get(&kept).is_some());
        assert!(f.pool.is_live(&kept));
    }
}
