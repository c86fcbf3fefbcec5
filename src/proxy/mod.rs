//! # Proxy registries
//!
//! A proxy is the in-world stand-in for an eliminated participant. Every proxy
//! kind shares one lifecycle, implemented once by [`registry::ProxyRegistry`]:
//!
//! - at most one live proxy per participant,
//! - creation through a backend factory,
//! - a single idempotent removal primitive that every expiry path goes through
//!   (explicit removal, TTL sweep, context sweep, shutdown teardown).
//!
//! The specializations only add their placement and attribute policy:
//!
//! - [`corpse`] - a sleeping, skinned, optionally named figure
//! - [`annotation`] - a short floating line of text ("last words")

pub mod annotation;
pub mod corpse;
pub mod placement;
pub mod registry;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::ContextId;

pub use annotation::{AnnotationRegistry, AnnotationSettings};
pub use corpse::{CorpseRegistry, CorpseSettings, EliminatedParticipant};
pub use placement::{Location, Offset, OrientationMode};
pub use registry::{NewProxy, ProxyInfo, ProxyRegistry, Ttl};

/// Identity of the participant a proxy stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    pub fn new_v4() -> Self {
        ParticipantId(Uuid::new_v4())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ParticipantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ParticipantId)
    }
}

impl From<Uuid> for ParticipantId {
    fn from(id: Uuid) -> Self {
        ParticipantId(id)
    }
}

/// Something that can drop every proxy belonging to one context.
///
/// Implemented by both specializations so the context-state bridge can tear
/// them down without knowing their payload types.
pub trait ContextScoped: Send + Sync {
    /// Short name used in logs ("corpse", "death message").
    fn kind(&self) -> &'static str;

    /// True when the configured TTL is unbounded, i.e. proxies live until
    /// their context ends and only the state sweep reclaims them.
    fn is_state_bound(&self) -> bool;

    /// Distinct contexts that currently own at least one live proxy.
    fn live_contexts(&self) -> Vec<ContextId>;

    fn remove_by_context(&self, context: &ContextId) -> Vec<ParticipantId>;
}
