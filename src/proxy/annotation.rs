//! Death-message proxies: a small floating line of text above the elimination spot.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use log::{error, warn};

use super::placement::{Location, Offset};
use super::registry::{NewProxy, ProxyInfo, ProxyRegistry, Ttl};
use super::{ContextScoped, ParticipantId};
use crate::backend::{LabelFlags, LabelHandle, PresentationBackend};
use crate::config::Config;
use crate::coordinator::ContextId;
use crate::error::ProxyError;
use crate::logutil::escape_log;

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationSettings {
    /// When false the intake never asks for a death message.
    pub enabled: bool,
    pub ttl: Ttl,
    pub height_offset: f64,
}

impl AnnotationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.death_message.enabled,
            ttl: config.death_message_ttl(),
            height_offset: config.death_message.height_offset,
        }
    }
}

pub struct AnnotationRegistry<B: PresentationBackend> {
    backend: Arc<B>,
    proxies: ProxyRegistry<B::Label>,
    settings: RwLock<Arc<AnnotationSettings>>,
}

impl<B: PresentationBackend> AnnotationRegistry<B> {
    pub const KIND: &'static str = "death message";

    pub fn new(backend: Arc<B>, config: &Config) -> Self {
        Self {
            backend,
            proxies: ProxyRegistry::new(Self::KIND, config.debug_log()),
            settings: RwLock::new(Arc::new(AnnotationSettings::from_config(config))),
        }
    }

    pub fn settings(&self) -> Arc<AnnotationSettings> {
        Arc::clone(&self.settings.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn reconfigure(&self, config: &Config) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(AnnotationSettings::from_config(config));
        self.proxies.set_debug_log(config.debug_log());
    }

    /// Float `text` above `location` for `participant`.
    ///
    /// The registry does not look at the enable flag; that is the intake's call.
    pub fn create(
        &self,
        participant: ParticipantId,
        player_name: &str,
        location: &Location,
        context: ContextId,
        text: &str,
    ) -> Result<ProxyInfo, ProxyError> {
        let settings = self.settings();
        let player = escape_log(player_name);
        let request = NewProxy {
            key: participant,
            label: player_name.to_string(),
            placement: location.offset_by(&Offset::vertical(settings.height_offset)),
            context_id: context,
        };
        let result = self.proxies.create(request, |at| {
            let mut label = self.backend.spawn_label(at, text)?;
            if let Err(e) = label.set_label_flags(LabelFlags::default()) {
                warn!("Some armor stand properties could not be set: {}", e);
            }
            Ok(label)
        });

        match &result {
            Ok(info) => self.proxies.debug_log().lifecycle(&format!(
                "Death message created for player {} at {}: {}",
                player,
                info.placement,
                escape_log(text)
            )),
            Err(ProxyError::PlacementInvalid { reason, .. }) => {
                warn!("Cannot create death message for {}: {}", player, reason)
            }
            Err(e) => error!("Failed to create death message for player {}: {}", player, e),
        }
        result
    }

    pub fn remove(&self, key: &ParticipantId) -> bool {
        self.proxies.remove(key)
    }

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
}

impl<B: PresentationBackend> ContextScoped for AnnotationRegistry<B> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{EntityKind, MemoryBackend};
    use std::time::Duration;

    fn setup() -> (Arc<MemoryBackend>, AnnotationRegistry<MemoryBackend>) {
        let mut config = Config::default();
        config.death_message.enabled = true;
        let backend = Arc::new(MemoryBackend::new());
        let registry = AnnotationRegistry::new(Arc::clone(&backend), &config);
        (backend, registry)
    }

    #[test]
    fn text_floats_above_location() {
        let (backend, registry) = setup();
        let id = ParticipantId::new_v4();
        let info = registry
            .create(
                id,
                "Sam",
                &Location::new("arena", 5.0, 70.0, 5.0),
                ContextId::from("a"),
                "tell my wife",
            )
            .unwrap();
        assert_eq!(info.placement.y, 72.0);
        let entities = backend.live_entities();
        match &entities[0].kind {
            EntityKind::Label { text, flags } => {
                assert_eq!(text, "tell my wife");
                assert_eq!(*flags, Some(LabelFlags::default()));
            }
            other => panic!("expected label, got {:?}", other),
        }
    }

    #[test]
    fn rejected_flags_do_not_abort_creation() {
        let (backend, registry) = setup();
        backend.reject_label_flags(true);
        let id = ParticipantId::new_v4();
        assert!(registry
            .create(
                id,
                "Sam",
                &Location::new("arena", 0.0, 0.0, 0.0),
                ContextId::from("a"),
                "gg"
            )
            .is_ok());
        assert!(registry.contains(&id));
    }

    #[test]
    fn short_ttl_expires_on_sweep() {
        let (backend, registry) = setup();
        let id = ParticipantId::new_v4();
        let info = registry
            .create(
                id,
                "Sam",
                &Location::new("arena", 0.0, 0.0, 0.0),
                ContextId::from("a"),
                "gg",
            )
            .unwrap();
        assert!(registry
            .sweep_expired(info.created_at + Duration::from_secs(4))
            .is_empty());
        assert_eq!(
            registry.sweep_expired(info.created_at + Duration::from_secs(6)),
            vec![id]
        );
        assert_eq!(backend.live_count(), 0);
    }
}
