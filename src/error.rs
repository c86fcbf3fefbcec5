use thiserror::Error;

use crate::coordinator::ContextId;
use crate::proxy::ParticipantId;

/// Errors raised by a presentation backend while materializing, decorating,
/// or tearing down a proxy resource.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend refused to spawn the resource at all.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// A non-critical attribute (skin, marker flags, ...) could not be applied.
    #[error("attribute '{attribute}' rejected: {reason}")]
    Attribute {
        attribute: &'static str,
        reason: String,
    },

    /// The resource could not be cleanly destroyed.
    #[error("release failed: {0}")]
    Release(String),
}

/// Errors returned by a registry creation attempt. Removal never fails.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyError {
    /// The nil identity cannot key a proxy.
    #[error("invalid participant key")]
    InvalidKey,

    /// The containing space of the target location could not be resolved.
    #[error("placement invalid for {key}: {reason}")]
    PlacementInvalid { key: ParticipantId, reason: String },

    /// A live proxy already exists for this participant.
    #[error("proxy already live for {0}")]
    DuplicateKey(ParticipantId),

    /// The backend failed while materializing the handle.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Errors raised while asking the external coordinator about a context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The coordinator could not be reached or threw during lookup.
    #[error("coordinator unavailable: {0}")]
    Unavailable(String),

    /// The coordinator does not know this context.
    #[error("unknown context: {0}")]
    UnknownContext(ContextId),
}
