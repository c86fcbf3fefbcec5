//! JSON-lines host protocol used by `corpsewarden start`.
//!
//! Each input line is one [`HostEvent`]; blank lines and lines starting with
//! `#` are ignored. Coordinator facts (`context_state`, `participant`) update
//! the in-memory coordinator directly, everything else goes through the
//! scheduler. Query commands answer with one [`HostReply`] line.
//!
//! ```text
//! {"event":"context_state","context":"arena1","state":"IN_GAME"}
//! {"event":"participant","id":"6f1c...","name":"Kim","context":"arena1","spectator":true}
//! {"event":"eliminated","participant":"6f1c...","name":"Kim","context":"arena1",
//!  "location":{"world":"arena1","x":1.0,"y":64.0,"z":1.0}}
//! {"event":"status"}
//! ```

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::coordinator::memory::MemoryCoordinator;
use crate::coordinator::{ContextId, ContextState, ParticipantInfo};
use crate::intake::EliminationEvent;
use crate::proxy::ParticipantId;
use crate::scheduler::SchedulerHandle;
use crate::service::ServiceStatus;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Eliminated(EliminationEvent),
    Departed {
        participant: ParticipantId,
        context: ContextId,
    },
    ContextState {
        context: ContextId,
        state: ContextState,
    },
    Participant(ParticipantInfo),
    /// The participant is gone from the coordinator entirely.
    Forget {
        participant: ParticipantId,
    },
    Status,
    Reload,
    CleanupContext {
        context: ContextId,
    },
    Remove {
        participant: ParticipantId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum HostReply {
    Status(ServiceStatus),
    Reloaded,
    CleanedUp { context: ContextId, removed: usize },
    Removed { participant: ParticipantId, removed: bool },
    Error { message: String },
}

/// Parse one input line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<HostEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

pub struct Host {
    scheduler: SchedulerHandle,
    coordinator: MemoryCoordinator,
    config_path: String,
}

impl Host {
    pub fn new(
        scheduler: SchedulerHandle,
        coordinator: MemoryCoordinator,
        config_path: impl Into<String>,
    ) -> Self {
        Self {
            scheduler,
            coordinator,
            config_path: config_path.into(),
        }
    }

    pub async fn handle_line(&self, line: &str) -> Option<HostReply> {
        match parse_line(line) {
            Ok(Some(event)) => self.handle(event).await,
            Ok(None) => None,
            Err(e) => Some(HostReply::Error {
                message: format!("bad event: {}", e),
            }),
        }
    }

    pub async fn handle(&self, event: HostEvent) -> Option<HostReply> {
        let stopped = || {
            Some(HostReply::Error {
                message: "scheduler stopped".to_string(),
            })
        };
        match event {
            HostEvent::Eliminated(event) => {
                if self.scheduler.eliminated(event) {
                    None
                } else {
                    stopped()
                }
            }
            HostEvent::Departed {
                participant,
                context,
            } => {
                self.coordinator.update_participant(&participant, |p| {
                    p.connected = false;
                });
                if self.scheduler.departed(participant, context) {
                    None
                } else {
                    stopped()
                }
            }
            HostEvent::ContextState { context, state } => {
                self.coordinator.set_context_state(context, state);
                None
            }
            HostEvent::Participant(info) => {
                self.coordinator.upsert_participant(info);
                None
            }
            HostEvent::Forget { participant } => {
                self.coordinator.remove_participant(&participant);
                None
            }
            HostEvent::Status => match self.scheduler.status().await {
                Some(status) => Some(HostReply::Status(status)),
                None => stopped(),
            },
            HostEvent::Reload => match Config::load(&self.config_path).await {
                Ok(config) => {
                    if self.scheduler.reload(config).await {
                        Some(HostReply::Reloaded)
                    } else {
                        stopped()
                    }
                }
                Err(e) => {
                    log::warn!("Reload failed, keeping current configuration: {}", e);
                    Some(HostReply::Error {
                        message: e.to_string(),
                    })
                }
            },
            HostEvent::CleanupContext { context } => {
                match self.scheduler.cleanup_context(context.clone()).await {
                    Some(removed) => Some(HostReply::CleanedUp { context, removed }),
                    None => stopped(),
                }
            }
            HostEvent::Remove { participant } => match self.scheduler.remove(participant).await {
                Some(removed) => Some(HostReply::Removed {
                    participant,
                    removed,
                }),
                None => stopped(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_and_comment_lines() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("   # warmup").unwrap().is_none());
    }

    #[test]
    fn parses_elimination() {
        let line = r#"{"event":"eliminated","participant":"8d0f3a52-4c1e-4d8a-9b57-0e5b0d1f2a33","name":"Kim","context":"arena1","location":{"world":"arena1","x":1.5,"y":64.0,"z":-2.0},"last_words":"gg"}"#;
        match parse_line(line).unwrap() {
            Some(HostEvent::Eliminated(ev)) => {
                assert_eq!(ev.name, "Kim");
                assert_eq!(ev.context, ContextId::from("arena1"));
                assert_eq!(ev.location.world_name(), Some("arena1"));
                assert_eq!(ev.last_words.as_deref(), Some("gg"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_state_and_participant() {
        let state = parse_line(r#"{"event":"context_state","context":"a","state":"ENDING"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            state,
            HostEvent::ContextState {
                context: ContextId::from("a"),
                state: ContextState::Ending
            }
        );
        let participant = parse_line(
            r#"{"event":"participant","id":"8d0f3a52-4c1e-4d8a-9b57-0e5b0d1f2a33","name":"Kim","spectator":true}"#,
        )
        .unwrap()
        .unwrap();
        match participant {
            HostEvent::Participant(info) => {
                assert!(info.spectator);
                assert!(info.connected);
                assert!(info.context.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_line("{not json").is_err());
        assert!(parse_line(r#"{"event":"explode"}"#).is_err());
    }

    #[test]
    fn replies_are_tagged() {
        let json = serde_json::to_string(&HostReply::CleanedUp {
            context: ContextId::from("a"),
            removed: 3,
        })
        .unwrap();
        assert_eq!(json, r#"{"reply":"cleaned_up","context":"a","removed":3}"#);
    }
}
