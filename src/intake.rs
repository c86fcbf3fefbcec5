//! Elimination intake.
//!
//! An elimination is checked twice. At event time the arena must be
//! `IN_GAME`; anything else (lobby deaths, post-game fall damage) is ignored.
//! After the settle delay the participant is looked up again and must still be
//! attached to the same arena, be a spectator, be connected and hold no live
//! corpse. Only then are the proxies created.

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::PresentationBackend;
use crate::coordinator::{ContextId, ContextState, Coordinator};
use crate::proxy::{
    AnnotationRegistry, CorpseRegistry, EliminatedParticipant, Location, ParticipantId, ProxyInfo,
};

/// A participant was eliminated at `location` inside `context`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminationEvent {
    pub participant: ParticipantId,
    pub name: String,
    pub location: Location,
    pub context: ContextId,
    /// Text for the floating death message, if the host captured any.
    #[serde(default)]
    pub last_words: Option<String>,
}

/// Why an elimination produced no proxy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("corpses and death messages are both disabled")]
    Disabled,
    #[error("arena {context} is {state}, not IN_GAME")]
    NotInGame {
        context: ContextId,
        state: &'static str,
    },
    #[error("coordinator lookup failed: {0}")]
    Coordinator(String),
    #[error("participant is no longer known")]
    Unknown,
    #[error("participant left arena {0}")]
    Detached(ContextId),
    #[error("participant is not a spectator")]
    NotEliminated,
    #[error("participant disconnected")]
    Disconnected,
    #[error("participant already has a corpse")]
    AlreadyHasCorpse,
}

/// Proxies created by one settled elimination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settled {
    pub corpse: Option<ProxyInfo>,
    pub annotation: Option<ProxyInfo>,
}

pub struct Intake<B: PresentationBackend, C: Coordinator> {
    coordinator: Arc<C>,
    corpses: Arc<CorpseRegistry<B>>,
    annotations: Arc<AnnotationRegistry<B>>,
}

impl<B: PresentationBackend, C: Coordinator> Intake<B, C> {
    pub fn new(
        coordinator: Arc<C>,
        corpses: Arc<CorpseRegistry<B>>,
        annotations: Arc<AnnotationRegistry<B>>,
    ) -> Self {
        Self {
            coordinator,
            corpses,
            annotations,
        }
    }

    /// Event-time gate. `Ok` means the event should be settled after the delay.
    pub fn admit(&self, event: &EliminationEvent) -> Result<(), Rejection> {
        if !self.corpses.settings().enabled && !self.annotations.settings().enabled {
            return Err(Rejection::Disabled);
        }
        let state = self
            .coordinator
            .context_state(&event.context)
            .map_err(|e| Rejection::Coordinator(e.to_string()))?;
        if state != ContextState::InGame {
            return Err(Rejection::NotInGame {
                context: event.context.clone(),
                state: state.name(),
            });
        }
        Ok(())
    }

    /// Re-verify eligibility after the settle delay and create the proxies.
    ///
    /// Creation failures are logged by the registries and leave the matching
    /// field `None`; only eligibility problems are returned as errors.
    pub fn settle(&self, event: &EliminationEvent) -> Result<Settled, Rejection> {
        let info = self
            .coordinator
            .participant(&event.participant)
            .map_err(|e| Rejection::Coordinator(e.to_string()))?
            .ok_or(Rejection::Unknown)?;
        if !info.is_attached_to(&event.context) {
            return Err(Rejection::Detached(event.context.clone()));
        }
        if !info.connected {
            return Err(Rejection::Disconnected);
        }
        if !info.spectator {
            return Err(Rejection::NotEliminated);
        }

        let mut settled = Settled::default();
        if self.corpses.settings().enabled {
            if self.corpses.contains(&event.participant) {
                return Err(Rejection::AlreadyHasCorpse);
            }
            let mut participant = EliminatedParticipant::from(&info);
            if participant.name.is_empty() {
                participant.name = event.name.clone();
            }
            settled.corpse = self
                .corpses
                .create(&participant, &event.location, event.context.clone())
                .ok();
        }

        let text = event.last_words.as_deref().map(str::trim).unwrap_or("");
        if self.annotations.settings().enabled && !text.is_empty() {
            if self.annotations.contains(&event.participant) {
                debug!("Death message for {} still floating", event.participant);
            } else {
                settled.annotation = self
                    .annotations
                    .create(
                        event.participant,
                        &event.name,
                        &event.location,
                        event.context.clone(),
                        text,
                    )
                    .ok();
            }
        }
        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::config::Config;
    use crate::coordinator::memory::MemoryCoordinator;
    use crate::coordinator::ParticipantInfo;

    struct Fixture {
        coord: Arc<MemoryCoordinator>,
        corpses: Arc<CorpseRegistry<MemoryBackend>>,
        annotations: Arc<AnnotationRegistry<MemoryBackend>>,
        intake: Intake<MemoryBackend, MemoryCoordinator>,
    }

    fn fixture(config: &Config) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let coord = Arc::new(MemoryCoordinator::new());
        let corpses = Arc::new(CorpseRegistry::new(Arc::clone(&backend), config));
        let annotations = Arc::new(AnnotationRegistry::new(Arc::clone(&backend), config));
        let intake = Intake::new(
            Arc::clone(&coord),
            Arc::clone(&corpses),
            Arc::clone(&annotations),
        );
        Fixture {
            coord,
            corpses,
            annotations,
            intake,
        }
    }

    fn eliminated(f: &Fixture, name: &str, last_words: Option<&str>) -> EliminationEvent {
        let arena = ContextId::from("arena1");
        f.coord.set_context_state(arena.clone(), ContextState::InGame);
        let mut info = ParticipantInfo::new(ParticipantId::new_v4(), name).in_context(arena.clone());
        info.spectator = true;
        let id = info.id;
        f.coord.upsert_participant(info);
        EliminationEvent {
            participant: id,
            name: name.to_string(),
            location: Location::new("arena1_world", 1.0, 65.0, 1.0),
            context: arena,
            last_words: last_words.map(str::to_string),
        }
    }

    #[test]
    fn lobby_deaths_are_ignored() {
        let f = fixture(&Config::default());
        let event = eliminated(&f, "Kim", None);
        f.coord
            .set_context_state(event.context.clone(), ContextState::WaitingForPlayers);
        assert!(matches!(
            f.intake.admit(&event),
            Err(Rejection::NotInGame { .. })
        ));
    }

    #[test]
    fn settled_elimination_creates_corpse() {
        let f = fixture(&Config::default());
        let event = eliminated(&f, "Kim", Some("gg"));
        f.intake.admit(&event).unwrap();
        let settled = f.intake.settle(&event).unwrap();
        assert!(settled.corpse.is_some());
        // death messages are off by default
        assert!(settled.annotation.is_none());
        assert_eq!(f.corpses.count(), 1);
    }

    #[test]
    fn death_message_needs_text() {
        let mut config = Config::default();
        config.death_message.enabled = true;
        let f = fixture(&config);
        let silent = eliminated(&f, "Kim", Some("   "));
        assert!(f.intake.settle(&silent).unwrap().annotation.is_none());
        let loud = eliminated(&f, "Lee", Some("avenge me"));
        assert!(f.intake.settle(&loud).unwrap().annotation.is_some());
        assert_eq!(f.annotations.count(), 1);
    }

    #[test]
    fn rejoined_or_disconnected_participants_are_skipped() {
        let f = fixture(&Config::default());
        let event = eliminated(&f, "Kim", None);
        f.coord
            .update_participant(&event.participant, |p| p.context = Some(ContextId::from("other")));
        assert_eq!(
            f.intake.settle(&event),
            Err(Rejection::Detached(event.context.clone()))
        );

        let event = eliminated(&f, "Lee", None);
        f.coord
            .update_participant(&event.participant, |p| p.connected = false);
        assert_eq!(f.intake.settle(&event), Err(Rejection::Disconnected));
        assert_eq!(f.corpses.count(), 0);
    }

    #[test]
    fn second_settle_does_not_duplicate() {
        let f = fixture(&Config::default());
        let event = eliminated(&f, "Kim", None);
        f.intake.settle(&event).unwrap();
        assert_eq!(f.intake.settle(&event), Err(Rejection::AlreadyHasCorpse));
        assert_eq!(f.corpses.count(), 1);
    }

    #[test]
    fn everything_disabled_rejects_early() {
        let mut config = Config::default();
        config.corpse.enabled = false;
        let f = fixture(&config);
        let event = eliminated(&f, "Kim", Some("bye"));
        assert_eq!(f.intake.admit(&event), Err(Rejection::Disabled));
    }
}
