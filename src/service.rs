//! # Proxy service
//!
//! [`ProxyService`] owns both registries, the intake and the context-state
//! bridge, and exposes the administrative surface (`reload`, `status`,
//! `cleanup_context`). It is synchronous; time is driven from outside by the
//! [`scheduler`](crate::scheduler), which [`ProxyService::start`] spawns.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use corpsewarden::backend::memory::MemoryBackend;
//! use corpsewarden::config::Config;
//! use corpsewarden::coordinator::memory::MemoryCoordinator;
//! use corpsewarden::service::ProxyService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("corpsewarden.toml").await?;
//!     let service = ProxyService::new(
//!         config,
//!         Arc::new(MemoryBackend::new()),
//!         Arc::new(MemoryCoordinator::new()),
//!     );
//!     let scheduler = Arc::new(service).start();
//!     // ... feed events ...
//!     scheduler.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use log::{debug, info, warn};
use serde::Serialize;

use crate::backend::PresentationBackend;
use crate::bridge::{ContextStateBridge, ReconcileReport};
use crate::config::Config;
use crate::coordinator::{ContextId, Coordinator};
use crate::intake::{EliminationEvent, Intake, Rejection, Settled};
use crate::logutil::escape_log;
use crate::metrics;
use crate::proxy::{AnnotationRegistry, ContextScoped, CorpseRegistry, ParticipantId};
use crate::scheduler::{start_scheduler, SchedulerHandle};

/// Live count and policy of one registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStatus {
    pub enabled: bool,
    pub live: usize,
    /// `-1` when proxies live until their arena ends.
    pub ttl_secs: i64,
}

/// Process-wide counters from [`metrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterStatus {
    pub sweeps_run: u64,
    pub reconcile_passes: u64,
    pub coordinator_failures: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub language: String,
    pub debug: bool,
    pub corpses: RegistryStatus,
    pub death_messages: RegistryStatus,
    pub counters: CounterStatus,
}

pub struct ProxyService<B: PresentationBackend, C: Coordinator> {
    config: RwLock<Arc<Config>>,
    corpses: Arc<CorpseRegistry<B>>,
    annotations: Arc<AnnotationRegistry<B>>,
    intake: Intake<B, C>,
    bridge: ContextStateBridge<C>,
}

impl<B: PresentationBackend, C: Coordinator> ProxyService<B, C> {
    pub fn new(config: Config, backend: Arc<B>, coordinator: Arc<C>) -> Self {
        let corpses = Arc::new(CorpseRegistry::new(Arc::clone(&backend), &config));
        let annotations = Arc::new(AnnotationRegistry::new(backend, &config));
        let intake = Intake::new(
            Arc::clone(&coordinator),
            Arc::clone(&corpses),
            Arc::clone(&annotations),
        );
        let targets: Vec<Arc<dyn ContextScoped>> = vec![
            Arc::clone(&corpses) as Arc<dyn ContextScoped>,
            Arc::clone(&annotations) as Arc<dyn ContextScoped>,
        ];
        let bridge = ContextStateBridge::new(coordinator, targets);
        info!(
            "Corpse service ready (corpse duration {}s, death messages {})",
            config.corpse.duration,
            if config.death_message.enabled {
                "on"
            } else {
                "off"
            }
        );
        Self {
            config: RwLock::new(Arc::new(config)),
            corpses,
            annotations,
            intake,
            bridge,
        }
    }

    /// Spawn the scheduler task that drives this service.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        start_scheduler(self)
    }

    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn corpses(&self) -> &Arc<CorpseRegistry<B>> {
        &self.corpses
    }

    pub fn annotations(&self) -> &Arc<AnnotationRegistry<B>> {
        &self.annotations
    }

    pub fn bridge(&self) -> &ContextStateBridge<C> {
        &self.bridge
    }

    /// Swap in a new configuration. Live proxies are untouched; the next
    /// sweep uses the new durations.
    pub fn reload(&self, config: Config) {
        self.corpses.reconfigure(&config);
        self.annotations.reconfigure(&config);
        let debug_log = config.debug_log();
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        info!("Configuration reloaded");
        debug_log.lifecycle("Debug logging active");
    }

    pub fn status(&self) -> ServiceStatus {
        let config = self.config();
        let corpse = self.corpses.settings();
        let message = self.annotations.settings();
        let counters = metrics::snapshot();
        ServiceStatus {
            language: config.language.clone(),
            debug: config.debug.enabled,
            corpses: RegistryStatus {
                enabled: corpse.enabled,
                live: self.corpses.count(),
                ttl_secs: corpse.ttl.as_secs(),
            },
            death_messages: RegistryStatus {
                enabled: message.enabled,
                live: self.annotations.count(),
                ttl_secs: message.ttl.as_secs(),
            },
            counters: CounterStatus {
                sweeps_run: counters.sweeps_run,
                reconcile_passes: counters.reconcile_passes,
                coordinator_failures: counters.coordinator_failures,
            },
        }
    }

    /// Event-time half of an elimination. `true` means settle it later.
    pub fn admit_elimination(&self, event: &EliminationEvent) -> bool {
        match self.intake.admit(event) {
            Ok(()) => true,
            Err(Rejection::Coordinator(e)) => {
                metrics::inc_coordinator_failures();
                debug!(
                    "Ignoring elimination of {}: {}",
                    escape_log(&event.name),
                    e
                );
                false
            }
            Err(reason) => {
                debug!(
                    "Ignoring elimination of {}: {}",
                    escape_log(&event.name),
                    reason
                );
                false
            }
        }
    }

    /// Settle-delay half of an elimination.
    pub fn settle_elimination(&self, event: &EliminationEvent) -> Option<Settled> {
        match self.intake.settle(event) {
            Ok(settled) => Some(settled),
            Err(reason) => {
                debug!(
                    "Elimination of {} no longer eligible: {}",
                    escape_log(&event.name),
                    reason
                );
                None
            }
        }
    }

    /// One delayed departure pass for `context`.
    pub fn departure_pass(&self, context: &ContextId) -> ReconcileReport {
        self.bridge.reconcile_context(context)
    }

    pub fn reconcile(&self) -> ReconcileReport {
        self.bridge.reconcile()
    }

    pub fn sweep_corpses(&self, now: Instant) -> usize {
        metrics::inc_sweeps_run();
        self.corpses.sweep_expired(now).len()
    }

    pub fn sweep_annotations(&self, now: Instant) -> usize {
        metrics::inc_sweeps_run();
        self.annotations.sweep_expired(now).len()
    }

    /// Remove both proxies of one participant.
    pub fn remove(&self, participant: &ParticipantId) -> bool {
        let corpse = self.corpses.remove(participant);
        let message = self.annotations.remove(participant);
        corpse || message
    }

    pub fn cleanup_context(&self, context: &ContextId) -> usize {
        self.bridge.cleanup_context(context)
    }

    /// Release every live proxy. Called once the scheduler has stopped.
    pub fn teardown(&self) -> usize {
        let corpses = self.corpses.remove_all();
        let messages = self.annotations.remove_all();
        if corpses + messages > 0 {
            info!(
                "Removed {} corpses and {} death messages on shutdown",
                corpses, messages
            );
        }
        if self.corpses.count() + self.annotations.count() > 0 {
            warn!("Proxies were created during teardown and remain live");
        }
        corpses + messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::coordinator::memory::MemoryCoordinator;
    use crate::proxy::Location;

    fn service(config: Config) -> ProxyService<MemoryBackend, MemoryCoordinator> {
        ProxyService::new(
            config,
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryCoordinator::new()),
        )
    }

    #[test]
    fn status_reports_policy() {
        let mut config = Config::default();
        config.language = "en_US".into();
        config.corpse.duration = -1;
        let svc = service(config);
        let status = svc.status();
        assert_eq!(status.language, "en_US");
        assert!(!status.debug);
        assert_eq!(status.corpses.ttl_secs, -1);
        assert_eq!(status.death_messages.ttl_secs, 5);
        assert!(!status.death_messages.enabled);
    }

    #[test]
    fn status_carries_process_counters() {
        let svc = service(Config::default());
        let before = svc.status().counters;
        svc.sweep_corpses(Instant::now());
        svc.sweep_annotations(Instant::now());
        // counters are process-wide; other tests may add to them concurrently
        assert!(svc.status().counters.sweeps_run >= before.sweeps_run + 2);
    }

    #[test]
    fn reload_is_visible_in_status() {
        let svc = service(Config::default());
        let mut config = Config::default();
        config.debug.enabled = true;
        config.death_message.enabled = true;
        config.corpse.duration = 90;
        svc.reload(config);
        let status = svc.status();
        assert!(status.debug);
        assert!(status.death_messages.enabled);
        assert_eq!(status.corpses.ttl_secs, 90);
    }

    #[test]
    fn remove_covers_both_kinds() {
        let mut config = Config::default();
        config.death_message.enabled = true;
        let svc = service(config);
        let id = ParticipantId::new_v4();
        svc.annotations()
            .create(
                id,
                "Rin",
                &Location::new("w", 0.0, 0.0, 0.0),
                ContextId::from("a"),
                "bye",
            )
            .unwrap();
        assert!(svc.remove(&id));
        assert!(!svc.remove(&id));
    }
}
