use std::collections::HashSet;

use crate::sessions::{SessionId, SessionRegistry};

/// Outcome of one bounded eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPass {
    /// Sessions made dormant, in eviction order.
    pub evicted: Vec<SessionId>,
    /// Sessions whose serialization failed; they stay live.
    pub failed: Vec<SessionId>,
    pub iterations: usize,
    /// The iteration ceiling tripped while still over capacity.
    pub runaway: bool,
    /// No eligible candidate was left while still over capacity.
    pub deferred: bool,
}

impl EvictionPass {
    pub fn is_noop(&self) -> bool {
        self.iterations == 0
    }
}

/// What a reconciliation pass repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Unknown to the supervisor; dropped from the pool and the registry.
    pub dropped: Vec<SessionId>,
    /// Dormant in the pool but not buffered; buffering re-requested.
    pub rebuffered: Vec<SessionId>,
    /// Buffered by the supervisor while the pool was still live.
    pub completed: Vec<SessionId>,
    /// Inconsistencies left for the next pass.
    pub unresolved: Vec<SessionId>,
}

/// Pick the session to evict next.
///
/// `live_lru` is the live subset of the recency order, most recent first.
/// Eligible: not `active`, not pinned, not excluded, not in a protected
/// state. Sessions missing from `registry` are eligible. Stopped sessions
/// win; otherwise the least recently touched does.
pub(crate) fn select_candidate<'a>(
    live_lru: impl DoubleEndedIterator<Item = &'a SessionId>,
    registry: &SessionRegistry,
    active: Option<&str>,
    pinned: &HashSet<SessionId>,
    excluded: &HashSet<SessionId>,
) -> Option<SessionId> {
    let mut least_recent = None;

    for id in live_lru.rev() {
        if Some(id.as_str()) == active || pinned.contains(id) || excluded.contains(id) {
            continue;
        }
        match registry.state_of(id) {
            Some(state) if state.is_protected() => continue,
            Some(state) if state.is_terminal() => return Some(id.clone()),
            _ => {
                if least_recent.is_none() {
                    least_recent = Some(id.clone());
                }
            }
        }
    }

    least_recent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::{LifecycleState, SessionKind};

    fn registry_with(states: &[LifecycleState]) -> (SessionRegistry, Vec<SessionId>) {
        let mut registry = SessionRegistry::new();
        let mut ids = Vec::new();
        for state in states {
            let id = registry
                .create("webapp", None, SessionKind::PlainShell)
                .unwrap();
            if *state != LifecycleState::Starting {
                if state.is_protected() || *state == LifecycleState::Done {
                    registry.set_state(&id, LifecycleState::Busy).unwrap();
                }
                registry.set_state(&id, *state).unwrap();
            }
            ids.push(id);
        }
        (registry, ids)
    }

    #[test]
    fn test_least_recent_wins() {
        let (registry, ids) = registry_with(&[LifecycleState::Done; 3]);
        let none = HashSet::new();
        let picked = select_candidate(ids.iter(), &registry, None, &none, &none);
        assert_eq!(picked.as_ref(), ids.last());
    }

    #[test]
    fn test_stopped_preferred_over_recency() {
        let (registry, ids) = registry_with(&[
            LifecycleState::Stopped,
            LifecycleState::Done,
            LifecycleState::Done,
        ]);
        let none = HashSet::new();
        let picked = select_candidate(ids.iter(), &registry, None, &none, &none);
        assert_eq!(picked.as_ref(), Some(&ids[0]));
    }

    #[test]
    fn test_protected_active_and_pinned_skipped() {
        let (registry, ids) = registry_with(&[
            LifecycleState::Done,
            LifecycleState::Done,
            LifecycleState::Question,
            LifecycleState::Permission,
        ]);
        let pinned: HashSet<_> = [ids[1].clone()].into_iter().collect();
        let none = HashSet::new();
        assert_eq!(
            select_candidate(ids.iter(), &registry, Some(&ids[0]), &pinned, &none),
            None
        );
    }

    #[test]
    fn test_unknown_sessions_are_eligible() {
        let registry = SessionRegistry::new();
        let ids = vec!["ghost".to_string()];
        let none = HashSet::new();
        assert_eq!(
            select_candidate(ids.iter(), &registry, None, &none, &none),
            Some("ghost".to_string())
        );
    }
}
