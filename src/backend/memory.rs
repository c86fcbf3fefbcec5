//! In-memory presentation backend.
//!
//! Keeps a table of "entities" instead of drawing anything. Every spawn,
//! attribute change and release is recorded so callers can inspect exactly
//! what a registry did. Failure switches let tests exercise the error paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use super::{
    FigureHandle, FigureSpec, LabelFlags, LabelHandle, PresentationBackend, ProxyHandle, Texture,
};
use crate::error::BackendError;
use crate::logutil::escape_log;
use crate::proxy::Location;

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Figure {
        spec: FigureSpec,
        texture: Option<Texture>,
    },
    Label {
        text: String,
        flags: Option<LabelFlags>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u64,
    pub location: Location,
    pub kind: EntityKind,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    live: HashMap<u64, Entity>,
    release_calls: HashMap<u64, u32>,
    spawned_total: u64,
    fail_spawns: bool,
    fail_releases: bool,
    reject_signed_textures: bool,
    reject_label_flags: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn(&self, location: &Location, kind: EntityKind) -> Result<MemoryHandle, BackendError> {
        let mut state = self.state();
        if state.fail_spawns {
            return Err(BackendError::Spawn("entity manager unavailable".to_string()));
        }
        state.next_id += 1;
        state.spawned_total += 1;
        let id = state.next_id;
        state.live.insert(
            id,
            Entity {
                id,
                location: location.clone(),
                kind,
            },
        );
        debug!("memory backend: spawned entity #{} at {}", id, location);
        Ok(MemoryHandle {
            id,
            state: Arc::clone(&self.state),
        })
    }

    /// Make every subsequent spawn fail.
    pub fn fail_spawns(&self, fail: bool) {
        self.state().fail_spawns = fail;
    }

    /// Make every subsequent release fail (the entity stays behind, leaked).
    pub fn fail_releases(&self, fail: bool) {
        self.state().fail_releases = fail;
    }

    /// Refuse signed textures, as a backend without profile support would.
    pub fn reject_signed_textures(&self, reject: bool) {
        self.state().reject_signed_textures = reject;
    }

    pub fn reject_label_flags(&self, reject: bool) {
        self.state().reject_label_flags = reject;
    }

    pub fn live_count(&self) -> usize {
        self.state().live.len()
    }

    pub fn spawned_total(&self) -> u64 {
        self.state().spawned_total
    }

    /// Total number of release attempts across all handles.
    pub fn release_count(&self) -> u64 {
        self.state().release_calls.values().map(|n| *n as u64).sum()
    }

    /// Release attempts per entity id.
    pub fn release_calls(&self) -> HashMap<u64, u32> {
        self.state().release_calls.clone()
    }

    pub fn live_entities(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.state().live.values().cloned().collect();
        entities.sort_by_key(|e| e.id);
        entities
    }
}

impl PresentationBackend for MemoryBackend {
    type Figure = MemoryHandle;
    type Label = MemoryHandle;

    fn spawn_figure(&self, at: &Location, spec: &FigureSpec) -> Result<MemoryHandle, BackendError> {
        self.spawn(
            at,
            EntityKind::Figure {
                spec: spec.clone(),
                texture: None,
            },
        )
    }

    fn spawn_label(&self, at: &Location, text: &str) -> Result<MemoryHandle, BackendError> {
        self.spawn(
            at,
            EntityKind::Label {
                text: text.to_string(),
                flags: None,
            },
        )
    }
}

#[derive(Debug)]
pub struct MemoryHandle {
    id: u64,
    state: Arc<Mutex<State>>,
}

impl MemoryHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProxyHandle for MemoryHandle {
    fn release(self) -> Result<(), BackendError> {
        let mut state = self.state();
        *state.release_calls.entry(self.id).or_insert(0) += 1;
        if state.fail_releases {
            return Err(BackendError::Release(format!(
                "entity #{} refused to despawn",
                self.id
            )));
        }
        if state.live.remove(&self.id).is_none() {
            return Err(BackendError::Release(format!(
                "entity #{} already gone",
                self.id
            )));
        }
        debug!("memory backend: released entity #{}", self.id);
        Ok(())
    }
}

impl FigureHandle for MemoryHandle {
    fn set_texture(&mut self, texture: &Texture) -> Result<(), BackendError> {
        let mut state = self.state();
        if state.reject_signed_textures && matches!(texture, Texture::Signed { .. }) {
            return Err(BackendError::Attribute {
                attribute: "texture",
                reason: "signed textures unsupported".to_string(),
            });
        }
        match state.live.get_mut(&self.id).map(|e| &mut e.kind) {
            Some(EntityKind::Figure { texture: slot, spec }) => {
                debug!(
                    "memory backend: texture set on #{} ({})",
                    self.id,
                    escape_log(&spec.name)
                );
                *slot = Some(texture.clone());
                Ok(())
            }
            _ => Err(BackendError::Attribute {
                attribute: "texture",
                reason: format!("entity #{} is not a live figure", self.id),
            }),
        }
    }
}

impl LabelHandle for MemoryHandle {
    fn set_label_flags(&mut self, new_flags: LabelFlags) -> Result<(), BackendError> {
        let mut state = self.state();
        if state.reject_label_flags {
            return Err(BackendError::Attribute {
                attribute: "marker",
                reason: "armor stand flags unsupported".to_string(),
            });
        }
        match state.live.get_mut(&self.id).map(|e| &mut e.kind) {
            Some(EntityKind::Label { flags, .. }) => {
                *flags = Some(new_flags);
                Ok(())
            }
            _ => Err(BackendError::Attribute {
                attribute: "marker",
                reason: format!("entity #{} is not a live label", self.id),
            }),
        }
    }
}
