//! In-memory coordinator fed by host events (binary) or directly by tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::{ContextId, ContextState, Coordinator, ParticipantInfo};
use crate::error::CoordinatorError;
use crate::proxy::ParticipantId;

#[derive(Debug, Default)]
struct Inner {
    contexts: RwLock<HashMap<ContextId, ContextState>>,
    participants: RwLock<HashMap<ParticipantId, ParticipantInfo>>,
    failing: RwLock<HashSet<ContextId>>,
    unavailable: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCoordinator {
    inner: Arc<Inner>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_context_state(&self, context: ContextId, state: ContextState) {
        self.inner
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(context, state);
    }

    pub fn upsert_participant(&self, info: ParticipantInfo) {
        self.inner
            .participants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(info.id, info);
    }

    /// Apply `f` to a known participant. Returns `false` if unknown.
    pub fn update_participant(
        &self,
        id: &ParticipantId,
        f: impl FnOnce(&mut ParticipantInfo),
    ) -> bool {
        match self
            .inner
            .participants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(id)
        {
            Some(info) => {
                f(info);
                true
            }
            None => false,
        }
    }

    pub fn remove_participant(&self, id: &ParticipantId) -> Option<ParticipantInfo> {
        self.inner
            .participants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Simulate the coordinator plugin being absent: every lookup fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Make lookups for one context fail while others keep working.
    pub fn fail_context(&self, context: ContextId, fail: bool) {
        let mut failing = self
            .inner
            .failing
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if fail {
            failing.insert(context);
        } else {
            failing.remove(&context);
        }
    }

    fn check(&self, context: Option<&ContextId>) -> Result<(), CoordinatorError> {
        if self.inner.unavailable.load(Ordering::Relaxed) {
            return Err(CoordinatorError::Unavailable(
                "coordinator not loaded".to_string(),
            ));
        }
        if let Some(ctx) = context {
            let failing = self
                .inner
                .failing
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if failing.contains(ctx) {
                return Err(CoordinatorError::Unavailable(format!(
                    "lookup for arena {} threw",
                    ctx
                )));
            }
        }
        Ok(())
    }
}

impl Coordinator for MemoryCoordinator {
    fn context_state(&self, context: &ContextId) -> Result<ContextState, CoordinatorError> {
        self.check(Some(context))?;
        self.inner
            .contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(context)
            .copied()
            .ok_or_else(|| CoordinatorError::UnknownContext(context.clone()))
    }

    fn participant(&self, id: &ParticipantId) -> Result<Option<ParticipantInfo>, CoordinatorError> {
        self.check(None)?;
        Ok(self
            .inner
            .participants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    fn participants_in(&self, context: &ContextId) -> Result<Vec<ParticipantInfo>, CoordinatorError> {
        self.check(Some(context))?;
        Ok(self
            .inner
            .participants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|p| p.is_attached_to(context))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alive_count_ignores_spectators_and_other_contexts() {
        let coord = MemoryCoordinator::new();
        let arena = ContextId::from("a1");
        coord.set_context_state(arena.clone(), ContextState::InGame);
        for (name, spectator, ctx) in [
            ("alice", false, "a1"),
            ("bob", true, "a1"),
            ("carol", false, "a1"),
            ("dave", false, "a2"),
        ] {
            let mut p = ParticipantInfo::new(ParticipantId::new_v4(), name)
                .in_context(ContextId::from(ctx));
            p.spectator = spectator;
            coord.upsert_participant(p);
        }
        assert_eq!(coord.alive_participants(&arena).unwrap(), 2);
    }

    #[test]
    fn disconnected_players_are_not_alive() {
        let coord = MemoryCoordinator::new();
        let arena = ContextId::from("a1");
        coord.set_context_state(arena.clone(), ContextState::InGame);
        let ids: Vec<ParticipantId> = ["lee", "max"]
            .into_iter()
            .map(|name| {
                let p = ParticipantInfo::new(ParticipantId::new_v4(), name)
                    .in_context(arena.clone());
                let id = p.id;
                coord.upsert_participant(p);
                id
            })
            .collect();
        assert_eq!(coord.alive_participants(&arena).unwrap(), 2);

        coord.update_participant(&ids[0], |p| p.connected = false);
        assert_eq!(coord.alive_participants(&arena).unwrap(), 1);
        assert_eq!(coord.participants_in(&arena).unwrap().len(), 2);
    }

    #[test]
    fn failures_are_scoped() {
        let coord = MemoryCoordinator::new();
        let a = ContextId::from("a");
        let b = ContextId::from("b");
        coord.set_context_state(a.clone(), ContextState::Ending);
        coord.set_context_state(b.clone(), ContextState::Ending);
        coord.fail_context(a.clone(), true);
        assert!(coord.context_state(&a).is_err());
        assert_eq!(coord.context_state(&b).unwrap(), ContextState::Ending);

        coord.set_unavailable(true);
        assert!(matches!(
            coord.context_state(&b),
            Err(CoordinatorError::Unavailable(_))
        ));
    }

    #[test]
    fn unknown_context_is_an_error() {
        let coord = MemoryCoordinator::new();
        assert_eq!(
            coord.context_state(&ContextId::from("nope")),
            Err(CoordinatorError::UnknownContext(ContextId::from("nope")))
        );
    }
}
