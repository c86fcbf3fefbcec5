//! # Presentation backend port
//!
//! The backend is whatever actually makes a proxy visible in the world. The
//! registries only ever see it through these traits: a backend spawns
//! resources and hands back a handle, and the handle is the one and only way
//! to decorate or destroy that resource.
//!
//! [`memory::MemoryBackend`] is an in-process implementation used by the
//! binary's host mode and by the test-suite.

pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::proxy::Location;

/// Exclusive ownership of one live backend resource.
pub trait ProxyHandle: Send + 'static {
    /// Destroy the resource. Consumes the handle so it can only happen once.
    fn release(self) -> Result<(), BackendError>;
}

/// A human-shaped figure (the corpse).
pub trait FigureHandle: ProxyHandle {
    fn set_texture(&mut self, texture: &Texture) -> Result<(), BackendError>;
}

/// A floating text carrier (the death message).
pub trait LabelHandle: ProxyHandle {
    fn set_label_flags(&mut self, flags: LabelFlags) -> Result<(), BackendError>;
}

/// Skin applied to a figure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Texture {
    /// Signed texture properties copied from the participant's profile.
    Signed { value: String, signature: String },
    /// Default skin looked up by player name.
    Named { name: String },
}

/// Attributes fixed at figure creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FigureSpec {
    pub name: String,
    pub name_visible: bool,
    pub hide_from_tab_list: bool,
    pub sleeping: bool,
}

/// Display flags for a text carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelFlags {
    pub small: bool,
    pub marker: bool,
    pub gravity: bool,
}

impl Default for LabelFlags {
    fn default() -> Self {
        Self {
            small: true,
            marker: true,
            gravity: false,
        }
    }
}

pub trait PresentationBackend: Send + Sync + 'static {
    type Figure: FigureHandle;
    type Label: LabelHandle;

    fn spawn_figure(&self, at: &Location, spec: &FigureSpec) -> Result<Self::Figure, BackendError>;

    fn spawn_label(&self, at: &Location, text: &str) -> Result<Self::Label, BackendError>;
}
