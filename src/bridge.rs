//! Context-state bridge.
//!
//! Eliminations and the coordinator's own end-of-game bookkeeping are not
//! linked: a game can end after corpses were spawned, and a player can drop
//! without the arena ever reporting a clean finish. The bridge reconciles the
//! registries against what the coordinator says about each context.
//!
//! A context is treated as over when its state is anything but `IN_GAME`, or
//! when it is `IN_GAME` with at most one participant left alive. The second
//! rule is a heuristic for games that are mechanically over but not closed
//! yet; it can race a coordinator that updates asynchronously.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info};

use crate::coordinator::{ContextId, ContextState, Coordinator};
use crate::error::CoordinatorError;
use crate::metrics;
use crate::proxy::ContextScoped;

/// Maximum alive participants for which an `IN_GAME` context still counts as over.
pub const LAST_SURVIVOR_THRESHOLD: usize = 1;

/// Outcome of asking the coordinator about one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextVerdict {
    Running { alive: usize },
    /// Coordinator reports a terminal state.
    Ended(ContextState),
    /// `IN_GAME`, but nobody (or only the winner) is left.
    LastSurvivor { alive: usize },
}

impl ContextVerdict {
    pub fn is_over(&self) -> bool {
        !matches!(self, ContextVerdict::Running { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub contexts_checked: usize,
    pub contexts_ended: Vec<ContextId>,
    /// Contexts whose lookup failed; retried next cycle.
    pub skipped: Vec<ContextId>,
    pub removed: usize,
}

pub struct ContextStateBridge<C: Coordinator> {
    coordinator: Arc<C>,
    targets: Vec<Arc<dyn ContextScoped>>,
}

impl<C: Coordinator> ContextStateBridge<C> {
    pub fn new(coordinator: Arc<C>, targets: Vec<Arc<dyn ContextScoped>>) -> Self {
        Self {
            coordinator,
            targets,
        }
    }

    pub fn coordinator(&self) -> &Arc<C> {
        &self.coordinator
    }

    /// Ask the coordinator whether `context` is still running.
    pub fn assess(&self, context: &ContextId) -> Result<ContextVerdict, CoordinatorError> {
        let state = self.coordinator.context_state(context)?;
        if state.is_terminal() {
            return Ok(ContextVerdict::Ended(state));
        }
        let alive = self.coordinator.alive_participants(context)?;
        if alive <= LAST_SURVIVOR_THRESHOLD {
            Ok(ContextVerdict::LastSurvivor { alive })
        } else {
            Ok(ContextVerdict::Running { alive })
        }
    }

    /// Periodic pass over registries whose proxies live until their context ends.
    ///
    /// Each distinct context is looked up once per pass.
    pub fn reconcile(&self) -> ReconcileReport {
        metrics::inc_reconcile_passes();
        let targets: Vec<&Arc<dyn ContextScoped>> =
            self.targets.iter().filter(|t| t.is_state_bound()).collect();
        let contexts: BTreeSet<ContextId> = targets
            .iter()
            .flat_map(|t| t.live_contexts())
            .collect();

        let mut report = ReconcileReport::default();
        for context in contexts {
            self.check_context(&context, &targets, &mut report);
        }
        report
    }

    /// Departure-triggered pass for one context, applied to every registry.
    pub fn reconcile_context(&self, context: &ContextId) -> ReconcileReport {
        metrics::inc_reconcile_passes();
        let targets: Vec<&Arc<dyn ContextScoped>> = self.targets.iter().collect();
        let mut report = ReconcileReport::default();
        if targets.iter().any(|t| t.live_contexts().contains(context)) {
            self.check_context(context, &targets, &mut report);
        }
        report
    }

    /// Unconditional removal of every proxy in `context` (admin command).
    pub fn cleanup_context(&self, context: &ContextId) -> usize {
        let removed = self
            .targets
            .iter()
            .map(|t| t.remove_by_context(context).len())
            .sum();
        if removed > 0 {
            info!("Cleaned up {} proxies from arena {}", removed, context);
        }
        removed
    }

    fn check_context(
        &self,
        context: &ContextId,
        targets: &[&Arc<dyn ContextScoped>],
        report: &mut ReconcileReport,
    ) {
        report.contexts_checked += 1;
        let verdict = match self.assess(context) {
            Ok(v) => v,
            Err(e) => {
                metrics::inc_coordinator_failures();
                debug!("Skipping arena {} this cycle: {}", context, e);
                report.skipped.push(context.clone());
                return;
            }
        };
        if !verdict.is_over() {
            return;
        }

        let mut removed = 0;
        for target in targets {
            let n = target.remove_by_context(context).len();
            if n > 0 {
                debug!("{} {}s removed from arena {}", n, target.kind(), context);
            }
            removed += n;
        }
        report.contexts_ended.push(context.clone());
        report.removed += removed;
        if removed > 0 {
            info!(
                "Cleaned up {} proxies from arena {} ({:?})",
                removed, context, verdict
            );
        }
    }
}
