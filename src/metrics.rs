//! Process-wide proxy counters, keyed by registry kind.
//! The global counters are reported by the `status` admin command; the full
//! snapshot is logged at shutdown.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

static SWEEPS_RUN: AtomicU64 = AtomicU64::new(0);
static RECONCILE_PASSES: AtomicU64 = AtomicU64::new(0);
static COORDINATOR_FAILURES: AtomicU64 = AtomicU64::new(0);

static PROXY_COUNTERS: OnceLock<Mutex<HashMap<String, ProxyCounter>>> = OnceLock::new();

pub fn inc_sweeps_run() {
    SWEEPS_RUN.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_reconcile_passes() {
    RECONCILE_PASSES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_coordinator_failures() {
    COORDINATOR_FAILURES.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProxyCounter {
    pub created: u64,
    pub removed: u64,
    pub release_failures: u64,
    pub live_peak: u64,
}

fn proxy_counter_lock() -> &'static Mutex<HashMap<String, ProxyCounter>> {
    PROXY_COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn update(kind: &str, f: impl FnOnce(&mut ProxyCounter)) -> ProxyCounter {
    let mut guard = proxy_counter_lock()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let counter = guard.entry(kind.to_string()).or_default();
    f(counter);
    *counter
}

pub fn record_proxy_created(kind: &str, live_now: usize) -> ProxyCounter {
    update(kind, |c| {
        c.created = c.created.saturating_add(1);
        c.live_peak = c.live_peak.max(live_now as u64);
    })
}

pub fn record_proxy_removed(kind: &str) -> ProxyCounter {
    update(kind, |c| c.removed = c.removed.saturating_add(1))
}

/// A release that failed still counts as a removal from the registry's view.
pub fn record_release_failure(kind: &str) -> ProxyCounter {
    update(kind, |c| {
        c.removed = c.removed.saturating_add(1);
        c.release_failures = c.release_failures.saturating_add(1);
    })
}

pub fn proxy_counters_snapshot() -> HashMap<String, ProxyCounter> {
    proxy_counter_lock()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub sweeps_run: u64,
    pub reconcile_passes: u64,
    pub coordinator_failures: u64,
    pub proxies: HashMap<String, ProxyCounter>,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        sweeps_run: SWEEPS_RUN.load(Ordering::Relaxed),
        reconcile_passes: RECONCILE_PASSES.load(Ordering::Relaxed),
        coordinator_failures: COORDINATOR_FAILURES.load(Ordering::Relaxed),
        proxies: proxy_counters_snapshot(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_removed_and_failures_accumulate() {
        // Unique kind so parallel tests touching other kinds don't interfere.
        let kind = "metrics-unit-test";
        let first = record_proxy_created(kind, 1);
        assert_eq!(first.created, 1);
        assert_eq!(first.live_peak, 1);

        let second = record_proxy_created(kind, 2);
        assert_eq!(second.live_peak, 2);

        record_proxy_removed(kind);
        let failed = record_release_failure(kind);
        assert_eq!(failed.removed, 2);
        assert_eq!(failed.release_failures, 1);

        let snap = snapshot();
        let counter = snap.proxies.get(kind).expect("counter for kind");
        assert_eq!(counter.created, 2);
        assert_eq!(counter.live_peak, 2);
    }
}
