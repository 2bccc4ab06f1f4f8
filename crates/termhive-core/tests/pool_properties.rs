//! Pool behavior against an in-memory supervisor.

use std::collections::HashSet;
use std::sync::mpsc;

use proptest::prelude::*;
use termhive_core::pool::{
    CloseHandle, InstanceError, LiveInstance, Mount, OutputSource, Restoration, RestoredSession,
    SessionPool, SupervisorPort, TranscriptInstance,
};
use termhive_core::{LifecycleState, SessionKind, SessionRegistry, SupervisorError};

/// Output source fed by the test; `None` closes it.
struct ChannelSource {
    rx: mpsc::Receiver<Option<Vec<u8>>>,
    tx: mpsc::Sender<Option<Vec<u8>>>,
}

struct ChannelCloser(mpsc::Sender<Option<Vec<u8>>>);

impl CloseHandle for ChannelCloser {
    fn close(&self) {
        let _ = self.0.send(None);
    }
}

impl ChannelSource {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { rx, tx }
    }
}

impl OutputSource for ChannelSource {
    fn next_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.rx.recv().ok().flatten())
    }

    fn close_handle(&self) -> std::io::Result<Box<dyn CloseHandle>> {
        Ok(Box::new(ChannelCloser(self.tx.clone())))
    }
}

/// Supervisor that buffers nothing and always succeeds.
#[derive(Default)]
struct QuietSupervisor {
    buffering: HashSet<String>,
}

impl SupervisorPort for QuietSupervisor {
    type Stream = ChannelSource;

    fn begin_buffering(&mut self, id: &str) -> Result<(), SupervisorError> {
        self.buffering.insert(id.to_string());
        Ok(())
    }

    fn restore(&mut self, id: &str) -> Result<Restoration<ChannelSource>, SupervisorError> {
        self.buffering.remove(id);
        Ok(Restoration {
            flushed: Vec::new(),
            stream: ChannelSource::new(),
        })
    }

    fn close(&mut self, id: &str) -> Result<(), SupervisorError> {
        self.buffering.remove(id);
        Ok(())
    }
}

struct Screen(Vec<u8>);

impl LiveInstance for Screen {
    fn serialize(&self) -> Result<Vec<u8>, InstanceError> {
        Ok(self.0.clone())
    }

    fn cleanup(&mut self) -> Result<(), InstanceError> {
        Ok(())
    }
}

fn screen_mount() -> Box<Mount<'static, ChannelSource>> {
    Box::new(
        |restored: RestoredSession<ChannelSource>| -> Result<Box<dyn LiveInstance>, InstanceError> {
            Ok(Box::new(Screen(restored.replay_bytes())))
        },
    )
}

fn open_session(
    pool: &mut SessionPool<QuietSupervisor>,
    registry: &mut SessionRegistry,
    state: LifecycleState,
) -> String {
    let id = registry
        .create("webapp", Some("feature-auth"), SessionKind::InteractiveAgent)
        .unwrap();
    if state != LifecycleState::Starting {
        registry.set_state(&id, LifecycleState::Busy).unwrap();
        registry.set_state(&id, state).unwrap();
    }
    pool.register(&id, Box::new(Screen(format!("{}\n", id).into_bytes())))
        .unwrap();
    id
}

#[test]
fn scenario_a_switching_evicts_least_recently_touched() {
    let mut pool = SessionPool::new(QuietSupervisor::default(), 3);
    let mut registry = SessionRegistry::new();
    let none = HashSet::new();

    let mut ids = Vec::new();
    for _ in 0..5 {
        let id = open_session(&mut pool, &mut registry, LifecycleState::Done);
        pool.switch_to(&id, &registry, &none, screen_mount()).unwrap();
        ids.push(id);
    }

    let live: HashSet<_> = pool.live_ids().into_iter().collect();
    assert_eq!(live.len(), 3);
    assert!(pool.is_dormant(&ids[0]));
    assert!(pool.is_dormant(&ids[1]));
    for id in &ids[2..] {
        assert!(live.contains(id));
    }
}

#[test]
fn scenario_c_shrinking_evicts_in_one_pass() {
    let mut pool = SessionPool::new(QuietSupervisor::default(), 10);
    let mut registry = SessionRegistry::new();
    for _ in 0..8 {
        open_session(&mut pool, &mut registry, LifecycleState::Done);
    }

    let pass = pool.resize(3, &registry, None, &HashSet::new());

    assert_eq!(pass.evicted.len(), 5);
    assert!(pass.iterations <= 8);
    assert!(!pass.runaway);
    assert_eq!(pool.active_live_count(), 3);
    assert_eq!(pool.dormant_ids().len(), 5);
}

#[test]
fn resize_defers_when_only_protected_sessions_remain() {
    let mut pool = SessionPool::new(QuietSupervisor::default(), 6);
    let mut registry = SessionRegistry::new();
    for state in [
        LifecycleState::Busy,
        LifecycleState::Permission,
        LifecycleState::Question,
        LifecycleState::Done,
        LifecycleState::Stopped,
    ] {
        open_session(&mut pool, &mut registry, state);
    }

    let pass = pool.resize(2, &registry, None, &HashSet::new());

    assert_eq!(pass.evicted.len(), 2);
    assert!(pass.deferred);
    assert_eq!(pool.active_live_count(), 3);
}

#[test]
fn evict_then_restore_round_trips_transcript() {
    let mut pool = SessionPool::new(QuietSupervisor::default(), 5);
    let mut registry = SessionRegistry::new();
    let id = registry
        .create("webapp", None, SessionKind::PlainShell)
        .unwrap();

    let seed = b"$ cargo test\nrunning 3 tests\n".to_vec();
    let instance = TranscriptInstance::spawn(&id, seed.clone(), ChannelSource::new(), 4096).unwrap();
    pool.register(&id, Box::new(instance)).unwrap();

    pool.evict(&id).unwrap();
    assert_eq!(pool.snapshot_of(&id), Some(seed.as_slice()));
    assert!(pool.supervisor().buffering.contains(&id));

    let mount: Box<Mount<'static, ChannelSource>> = Box::new(
        |restored: RestoredSession<ChannelSource>| -> Result<Box<dyn LiveInstance>, InstanceError> {
            Ok(Box::new(TranscriptInstance::from_restored(restored, 4096)?))
        },
    );
    pool.restore(&id, mount).unwrap();

    let restored = pool.instance(&id).unwrap().serialize().unwrap();
    assert_eq!(restored, seed);
    assert!(!pool.supervisor().buffering.contains(&id));
}

#[test]
fn exit_while_dormant_needs_no_close() {
    let mut pool = SessionPool::new(QuietSupervisor::default(), 5);
    let mut registry = SessionRegistry::new();
    let id = open_session(&mut pool, &mut registry, LifecycleState::Done);
    pool.evict(&id).unwrap();

    let last = pool.handle_exit(&mut registry, &id, Some(1)).unwrap();

    assert_eq!(last.state, LifecycleState::Stopped);
    assert!(!pool.contains(&id));
    assert!(registry.is_empty());
}

fn any_state() -> impl Strategy<Value = LifecycleState> {
    prop::sample::select(LifecycleState::ALL.to_vec())
}

proptest! {
    #[test]
    fn live_count_within_capacity_after_pass(
        max_size in 2usize..8,
        sessions in 1usize..14,
        touches in prop::collection::vec(0usize..14, 0..40),
    ) {
        let mut pool = SessionPool::new(QuietSupervisor::default(), max_size);
        let mut registry = SessionRegistry::new();
        let ids: Vec<String> = (0..sessions)
            .map(|_| open_session(&mut pool, &mut registry, LifecycleState::Done))
            .collect();

        for t in touches {
            let id = &ids[t % ids.len()];
            let pass = pool
                .switch_to(id, &registry, &HashSet::new(), screen_mount())
                .unwrap();
            prop_assert!(!pass.runaway);
            prop_assert!(pool.active_live_count() <= max_size);
            prop_assert!(pool.is_live(id));
        }

        pool.enforce_capacity(&registry, None, &HashSet::new());
        prop_assert!(pool.active_live_count() <= max_size);
    }

    #[test]
    fn protected_sessions_never_chosen(
        states in prop::collection::vec(any_state(), 1..12),
        pinned_mask in prop::collection::vec(any::<bool>(), 12),
    ) {
        let mut pool = SessionPool::new(QuietSupervisor::default(), 2);
        let mut registry = SessionRegistry::new();
        let ids: Vec<String> = states
            .iter()
            .map(|s| open_session(&mut pool, &mut registry, *s))
            .collect();
        let pinned: HashSet<String> = ids
            .iter()
            .zip(&pinned_mask)
            .filter(|(_, p)| **p)
            .map(|(id, _)| id.clone())
            .collect();

        if let Some(candidate) = pool.eviction_candidate(&registry, ids.first().map(String::as_str), &pinned) {
            prop_assert!(!registry.state_of(&candidate).unwrap().is_protected());
            prop_assert!(!pinned.contains(&candidate));
            prop_assert_ne!(Some(&candidate), ids.first());
        }

        let pass = pool.enforce_capacity(&registry, None, &pinned);
        for id in &pass.evicted {
            prop_assert!(!registry.state_of(id).unwrap().is_protected());
        }
    }

    #[test]
    fn remove_leaves_no_residue(
        sessions in 1usize..6,
        evict_mask in prop::collection::vec(any::<bool>(), 6),
    ) {
        let mut pool = SessionPool::new(QuietSupervisor::default(), 10);
        let mut registry = SessionRegistry::new();
        let ids: Vec<String> = (0..sessions)
            .map(|_| open_session(&mut pool, &mut registry, LifecycleState::Done))
            .collect();
        for (id, evict) in ids.iter().zip(&evict_mask) {
            if *evict {
                pool.evict(id).unwrap();
            }
        }

        for id in &ids {
            pool.remove(id);
            pool.remove(id);
        }
        pool.remove("never-seen");

        prop_assert!(pool.lru_order().is_empty());
        prop_assert!(pool.live_ids().is_empty());
        prop_assert!(pool.dormant_ids().is_empty());
        prop_assert_eq!(pool.active_live_count(), 0);
    }
}
