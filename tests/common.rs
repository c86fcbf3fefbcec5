//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use corpsewarden::backend::memory::MemoryBackend;
use corpsewarden::config::Config;
use corpsewarden::coordinator::memory::MemoryCoordinator;
use corpsewarden::coordinator::{ContextId, ContextState, ParticipantInfo};
use corpsewarden::intake::EliminationEvent;
use corpsewarden::proxy::{EliminatedParticipant, Location, ParticipantId};

/// Config with millisecond cadences so scheduler tests finish quickly.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.logging.file = None;
    config.corpse.cleanup_interval_ms = 20;
    config.death_message.cleanup_interval_ms = 20;
    config.advanced.corpse_creation_delay_ms = 30;
    config.advanced.game_state_check_delay_ms = 40;
    config.advanced.safety_recheck_delay_ms = 80;
    config.advanced.reconcile_interval_ms = 50;
    config
}

pub fn backend() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::new())
}

pub fn spot(world: &str) -> Location {
    Location::new(world, 12.5, 64.0, -3.0).with_facing(90.0, 0.0)
}

pub fn eliminated(name: &str) -> EliminatedParticipant {
    EliminatedParticipant {
        id: ParticipantId::new_v4(),
        name: name.to_string(),
        texture: None,
    }
}

/// Register a spectator (already eliminated) participant in `context`.
pub fn spectator(coord: &MemoryCoordinator, name: &str, context: &str) -> ParticipantId {
    let mut info =
        ParticipantInfo::new(ParticipantId::new_v4(), name).in_context(ContextId::from(context));
    info.spectator = true;
    let id = info.id;
    coord.upsert_participant(info);
    id
}

/// Register `n` participants that are still alive in `context`.
pub fn alive(coord: &MemoryCoordinator, context: &str, n: usize) -> Vec<ParticipantId> {
    (0..n)
        .map(|i| {
            let info = ParticipantInfo::new(ParticipantId::new_v4(), format!("alive{}", i))
                .in_context(ContextId::from(context));
            let id = info.id;
            coord.upsert_participant(info);
            id
        })
        .collect()
}

pub fn in_game(coord: &MemoryCoordinator, context: &str) {
    coord.set_context_state(ContextId::from(context), ContextState::InGame);
}

pub fn elimination_event(
    participant: ParticipantId,
    name: &str,
    context: &str,
    last_words: Option<&str>,
) -> EliminationEvent {
    EliminationEvent {
        participant,
        name: name.to_string(),
        location: spot(context),
        context: ContextId::from(context),
        last_words: last_words.map(str::to_string),
    }
}

/// Poll `cond` until it holds or `within` elapses.
pub async fn wait_until(within: std::time::Duration, mut cond: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(within, async {
        while !cond() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}
