//! # Game coordinator port
//!
//! The coordinator is the external arena/session manager. This crate never
//! owns game state; it only asks the coordinator two kinds of question:
//! what state is a context in, and what do we know about a participant.
//!
//! The capability is injected at construction. A host without a coordinator
//! does not start the subsystem at all.

pub mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoordinatorError;
use crate::proxy::{Location, ParticipantId};

/// Identifier of an external context (arena / game session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        ContextId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(id: &str) -> Self {
        ContextId(id.to_string())
    }
}

impl From<String> for ContextId {
    fn from(id: String) -> Self {
        ContextId(id)
    }
}

/// Lifecycle state of a context as reported by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextState {
    WaitingForPlayers,
    Starting,
    InGame,
    Ending,
    Restarting,
}

impl ContextState {
    /// Anything but `InGame` makes the context's proxies eligible for removal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ContextState::InGame)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "WAITING_FOR_PLAYERS" | "WAITING" => Some(ContextState::WaitingForPlayers),
            "STARTING" => Some(ContextState::Starting),
            "IN_GAME" | "INGAME" => Some(ContextState::InGame),
            "ENDING" => Some(ContextState::Ending),
            "RESTARTING" => Some(ContextState::Restarting),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContextState::WaitingForPlayers => "WAITING_FOR_PLAYERS",
            ContextState::Starting => "STARTING",
            ContextState::InGame => "IN_GAME",
            ContextState::Ending => "ENDING",
            ContextState::Restarting => "RESTARTING",
        }
    }
}

/// Signed skin properties from a participant's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTexture {
    pub value: String,
    pub signature: String,
}

/// What the coordinator knows about one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    pub name: String,
    /// Context the participant is attached to, if any.
    #[serde(default)]
    pub context: Option<ContextId>,
    #[serde(default = "default_true")]
    pub connected: bool,
    /// Eliminated participants are kept around as spectators.
    #[serde(default)]
    pub spectator: bool,
    #[serde(default)]
    pub texture: Option<SignedTexture>,
    #[serde(default)]
    pub location: Option<Location>,
}

fn default_true() -> bool {
    true
}

impl ParticipantInfo {
    pub fn new(id: ParticipantId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            context: None,
            connected: true,
            spectator: false,
            texture: None,
            location: None,
        }
    }

    pub fn in_context(mut self, context: ContextId) -> Self {
        self.context = Some(context);
        self
    }

    pub fn is_attached_to(&self, context: &ContextId) -> bool {
        self.context.as_ref() == Some(context)
    }
}

pub trait Coordinator: Send + Sync + 'static {
    fn context_state(&self, context: &ContextId) -> Result<ContextState, CoordinatorError>;

    fn participant(&self, id: &ParticipantId) -> Result<Option<ParticipantInfo>, CoordinatorError>;

    /// Every participant currently attached to `context`, eliminated or not.
    fn participants_in(&self, context: &ContextId) -> Result<Vec<ParticipantInfo>, CoordinatorError>;

    /// Attached, connected participants that have not been eliminated yet.
    ///
    /// A player who dropped without a clean session end stays attached but no
    /// longer counts toward the survivors.
    fn alive_participants(&self, context: &ContextId) -> Result<usize, CoordinatorError> {
        Ok(self
            .participants_in(context)?
            .iter()
            .filter(|p| !p.spectator && p.connected)
            .count())
    }
}
