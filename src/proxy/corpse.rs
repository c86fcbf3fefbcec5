//! Corpse proxies: a sleeping, skinned figure left where a player was eliminated.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use log::{error, warn};

use super::placement::{Location, Offset, OrientationMode};
use super::registry::{NewProxy, ProxyInfo, ProxyRegistry, Ttl};
use super::{ContextScoped, ParticipantId};
use crate::backend::{FigureHandle, FigureSpec, PresentationBackend, Texture};
use crate::config::Config;
use crate::coordinator::{ContextId, ParticipantInfo, SignedTexture};
use crate::error::ProxyError;
use crate::logutil::{escape_log, translate_color_codes};

/// Corpse policy resolved from [`Config`]. Swapped as a whole on reload.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpseSettings {
    /// When false the intake never asks for a corpse.
    pub enabled: bool,
    pub ttl: Ttl,
    pub offset: Offset,
    pub orientation: OrientationMode,
    pub show_name: bool,
    pub name_format: String,
    pub hide_from_tab_list: bool,
}

impl CorpseSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.corpse.enabled,
            ttl: config.corpse_ttl(),
            offset: config.corpse.position_offset,
            orientation: config.orientation_mode(),
            show_name: config.corpse.show_name,
            name_format: config.corpse.name_format.clone(),
            hide_from_tab_list: config.corpse.hide_from_tab_list,
        }
    }

    /// Visible name of the figure; empty when names are hidden.
    pub fn visible_name(&self, player_name: &str) -> String {
        if self.show_name {
            translate_color_codes(&self.name_format.replace("{player}", player_name))
        } else {
            String::new()
        }
    }

    /// Apply the offset and orientation policy to the elimination location.
    pub fn resolve_placement(&self, base: &Location) -> Location {
        let mut placement = base.offset_by(&self.offset);
        self.orientation
            .apply(&mut placement, &mut rand::thread_rng());
        placement
    }
}

impl Default for CorpseSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// The participant a corpse is created for.
#[derive(Debug, Clone, PartialEq)]
pub struct EliminatedParticipant {
    pub id: ParticipantId,
    pub name: String,
    /// Signed skin properties, when the profile exposes them.
    pub texture: Option<SignedTexture>,
}

impl From<&ParticipantInfo> for EliminatedParticipant {
    fn from(info: &ParticipantInfo) -> Self {
        Self {
            id: info.id,
            name: info.name.clone(),
            texture: info.texture.clone(),
        }
    }
}

pub struct CorpseRegistry<B: PresentationBackend> {
    backend: Arc<B>,
    proxies: ProxyRegistry<B::Figure>,
    settings: RwLock<Arc<CorpseSettings>>,
}

impl<B: PresentationBackend> CorpseRegistry<B> {
    pub const KIND: &'static str = "corpse";

    pub fn new(backend: Arc<B>, config: &Config) -> Self {
        Self {
            backend,
            proxies: ProxyRegistry::new(Self::KIND, config.debug_log()),
            settings: RwLock::new(Arc::new(CorpseSettings::from_config(config))),
        }
    }

    pub fn settings(&self) -> Arc<CorpseSettings> {
        Arc::clone(&self.settings.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a new policy. Live corpses keep the attributes they were created with.
    pub fn reconfigure(&self, config: &Config) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(CorpseSettings::from_config(config));
        self.proxies.set_debug_log(config.debug_log());
    }

    /// Spawn a corpse for `participant` at `location`.
    ///
    /// Every failure is logged here and leaves no entry; callers may retry on
    /// the next eligible event.
    pub fn create(
        &self,
        participant: &EliminatedParticipant,
        location: &Location,
        context: ContextId,
    ) -> Result<ProxyInfo, ProxyError> {
        let settings = self.settings();
        let placement = settings.resolve_placement(location);
        let spec = FigureSpec {
            name: settings.visible_name(&participant.name),
            name_visible: settings.show_name,
            hide_from_tab_list: settings.hide_from_tab_list,
            sleeping: true,
        };
        let player = escape_log(&participant.name);

        let request = NewProxy {
            key: participant.id,
            label: participant.name.clone(),
            placement,
            context_id: context,
        };
        let result = self.proxies.create(request, |at| {
            let mut figure = self.backend.spawn_figure(at, &spec)?;
            apply_skin(&mut figure, participant);
            Ok(figure)
        });

        match &result {
            Ok(info) => self.proxies.debug_log().lifecycle(&format!(
                "Corpse spawned for player {} at {} with rotation mode {}",
                player,
                info.placement,
                settings.orientation.name()
            )),
            Err(ProxyError::PlacementInvalid { reason, .. }) => {
                warn!("Cannot create corpse for {}: {}", player, reason)
            }
            Err(ProxyError::DuplicateKey(_)) => {
                warn!("Corpse for {} already exists; keeping the live one", player)
            }
            Err(e) => error!("Failed to create corpse for player {}: {}", player, e),
        }
        result
    }

    pub fn remove(&self, key: &ParticipantId) -> bool {
        self.proxies.remove(key)
    }

    /// TTL sweep with the currently configured duration.
    pub fn sweep_expired(&self, now: Instant) -> Vec<ParticipantId> {
        self.proxies.sweep_expired(now, self.settings().ttl)
    }

    pub fn remove_all(&self) -> usize {
        self.proxies.remove_all()
    }

    pub fn count(&self) -> usize {
        self.proxies.count()
    }

    pub fn contains(&self, key: &ParticipantId) -> bool {
        self.proxies.contains(key)
    }

    pub fn get(&self, key: &ParticipantId) -> Option<ProxyInfo> {
        self.proxies.get(key)
    }

    pub fn snapshot(&self) -> Vec<ProxyInfo> {
        self.proxies.snapshot()
    }
}

impl<B: PresentationBackend> ContextScoped for CorpseRegistry<B> {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_state_bound(&self) -> bool {
        self.settings().ttl.is_unbounded()
    }

    fn live_contexts(&self) -> Vec<ContextId> {
        self.proxies.live_contexts()
    }

    fn remove_by_context(&self, context: &ContextId) -> Vec<ParticipantId> {
        self.proxies.remove_by_context(context)
    }
}

/// Copy the participant's signed skin, falling back to the name-based default.
fn apply_skin<F: FigureHandle>(figure: &mut F, participant: &EliminatedParticipant) {
    let fallback = Texture::Named {
        name: participant.name.clone(),
    };
    if let Some(signed) = &participant.texture {
        let texture = Texture::Signed {
            value: signed.value.clone(),
            signature: signed.signature.clone(),
        };
        match figure.set_texture(&texture) {
            Ok(()) => return,
            Err(e) => warn!(
                "Could not copy skin of {} ({}); using default texture",
                escape_log(&participant.name),
                e
            ),
        }
    }
    if let Err(e) = figure.set_texture(&fallback) {
        warn!(
            "Could not apply default texture for {}: {}",
            escape_log(&participant.name),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{EntityKind, MemoryBackend};

    fn participant(name: &str, texture: Option<SignedTexture>) -> EliminatedParticipant {
        EliminatedParticipant {
            id: ParticipantId::new_v4(),
            name: name.to_string(),
            texture,
        }
    }

    fn figure_of(backend: &MemoryBackend) -> (FigureSpec, Option<Texture>, Location) {
        let entities = backend.live_entities();
        assert_eq!(entities.len(), 1);
        match &entities[0].kind {
            EntityKind::Figure { spec, texture } => {
                (spec.clone(), texture.clone(), entities[0].location.clone())
            }
            other => panic!("expected figure, got {:?}", other),
        }
    }

    #[test]
    fn offset_and_fixed_rotation_are_applied() {
        let mut config = Config::default();
        config.corpse.position_offset = Offset { x: 1.0, y: 0.5, z: -1.0 };
        config.corpse.rotation.mode = "FIXED".into();
        config.corpse.rotation.fixed_yaw = 180.0;
        config.corpse.rotation.fixed_pitch = 15.0;
        let backend = Arc::new(MemoryBackend::new());
        let corpses = CorpseRegistry::new(Arc::clone(&backend), &config);

        let base = Location::new("arena", 10.0, 64.0, 10.0).with_facing(33.0, 3.0);
        let info = corpses
            .create(&participant("Alex", None), &base, ContextId::from("a"))
            .unwrap();
        assert_eq!(info.placement.x, 11.0);
        assert_eq!(info.placement.y, 64.5);
        assert_eq!(info.placement.z, 9.0);
        assert_eq!((info.placement.yaw, info.placement.pitch), (180.0, 15.0));
        assert_eq!(info.display_label, "Alex");
    }

    #[test]
    fn hidden_name_leaves_label_empty() {
        let mut config = Config::default();
        config.corpse.show_name = false;
        let backend = Arc::new(MemoryBackend::new());
        let corpses = CorpseRegistry::new(Arc::clone(&backend), &config);
        corpses
            .create(
                &participant("Alex", None),
                &Location::new("arena", 0.0, 0.0, 0.0),
                ContextId::from("a"),
            )
            .unwrap();
        let (spec, _, _) = figure_of(&backend);
        assert_eq!(spec.name, "");
        assert!(!spec.name_visible);
        assert!(spec.sleeping);
    }

    #[test]
    fn visible_name_uses_template() {
        let backend = Arc::new(MemoryBackend::new());
        let corpses = CorpseRegistry::new(Arc::clone(&backend), &Config::default());
        corpses
            .create(
                &participant("Alex", None),
                &Location::new("arena", 0.0, 0.0, 0.0),
                ContextId::from("a"),
            )
            .unwrap();
        let (spec, texture, _) = figure_of(&backend);
        assert_eq!(spec.name, "§7Alex's corpse");
        assert!(spec.name_visible);
        assert!(spec.hide_from_tab_list);
        assert_eq!(texture, Some(Texture::Named { name: "Alex".into() }));
    }

    #[test]
    fn signed_skin_is_copied() {
        let backend = Arc::new(MemoryBackend::new());
        let corpses = CorpseRegistry::new(Arc::clone(&backend), &Config::default());
        let skin = SignedTexture {
            value: "ewogICJ0".into(),
            signature: "c2lnbmF0".into(),
        };
        corpses
            .create(
                &participant("Alex", Some(skin.clone())),
                &Location::new("arena", 0.0, 0.0, 0.0),
                ContextId::from("a"),
            )
            .unwrap();
        let (_, texture, _) = figure_of(&backend);
        assert_eq!(
            texture,
            Some(Texture::Signed {
                value: skin.value,
                signature: skin.signature
            })
        );
    }

    #[test]
    fn rejected_skin_falls_back_and_creation_succeeds() {
        let backend = Arc::new(MemoryBackend::new());
        backend.reject_signed_textures(true);
        let corpses = CorpseRegistry::new(Arc::clone(&backend), &Config::default());
        let skin = SignedTexture {
            value: "v".into(),
            signature: "s".into(),
        };
        let p = participant("Alex", Some(skin));
        assert!(corpses
            .create(&p, &Location::new("arena", 0.0, 0.0, 0.0), ContextId::from("a"))
            .is_ok());
        let (_, texture, _) = figure_of(&backend);
        assert_eq!(texture, Some(Texture::Named { name: "Alex".into() }));
        assert!(corpses.contains(&p.id));
    }

    #[test]
    fn spawn_failure_leaves_no_entry() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_spawns(true);
        let corpses = CorpseRegistry::new(Arc::clone(&backend), &Config::default());
        let p = participant("Alex", None);
        let err = corpses
            .create(&p, &Location::new("arena", 0.0, 0.0, 0.0), ContextId::from("a"))
            .unwrap_err();
        assert!(matches!(err, ProxyError::Backend(_)));
        assert_eq!(corpses.count(), 0);
    }

    #[test]
    fn reconfigure_switches_ttl_for_next_sweep() {
        let backend = Arc::new(MemoryBackend::new());
        let corpses = CorpseRegistry::new(Arc::clone(&backend), &Config::default());
        assert!(!corpses.is_state_bound());
        let info = corpses
            .create(
                &participant("Alex", None),
                &Location::new("arena", 0.0, 0.0, 0.0),
                ContextId::from("a"),
            )
            .unwrap();

        let mut config = Config::default();
        config.corpse.duration = -1;
        corpses.reconfigure(&config);
        assert!(corpses.is_state_bound());
        let far_future = info.created_at + std::time::Duration::from_secs(3600);
        assert!(corpses.sweep_expired(far_future).is_empty());
        assert_eq!(corpses.count(), 1);
    }
}
