//! Generic keyed registry of live proxies.
//!
//! The registry owns each backend handle exclusively. Every destruction path
//! funnels into [`ProxyRegistry::remove`], which takes the entry out of the map
//! under the lock and releases the handle after the lock is dropped. Whoever
//! takes the entry performs the release; concurrent removers see `false`.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use log::{debug, error};

use crate::backend::ProxyHandle;
use crate::coordinator::ContextId;
use crate::error::{BackendError, ProxyError};
use crate::logutil::{escape_log, DebugLog};
use crate::metrics;

use super::placement::Location;
use super::ParticipantId;

/// Time budget of a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Keep until the context ends; TTL sweeps never remove anything.
    Unbounded,
    Bounded(Duration),
}

impl Ttl {
    /// Interpret a configured duration in seconds. Negative values (the
    /// documented sentinel is `-1`) mean [`Ttl::Unbounded`].
    pub fn from_secs(secs: i64) -> Self {
        if secs < 0 {
            Ttl::Unbounded
        } else {
            Ttl::Bounded(Duration::from_secs(secs as u64))
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, Ttl::Unbounded)
    }

    /// Seconds for display, `-1` when unbounded.
    pub fn as_secs(&self) -> i64 {
        match self {
            Ttl::Unbounded => -1,
            Ttl::Bounded(d) => d.as_secs() as i64,
        }
    }
}

/// A creation request. The placement is already resolved by the specialization.
#[derive(Debug, Clone)]
pub struct NewProxy {
    pub key: ParticipantId,
    pub label: String,
    pub placement: Location,
    pub context_id: ContextId,
}

/// Read-only view of a live record (the handle itself never leaves the registry).
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyInfo {
    pub key: ParticipantId,
    pub display_label: String,
    pub placement: Location,
    pub created_at: Instant,
    pub context_id: ContextId,
}

struct ProxyRecord<H> {
    info: ProxyInfo,
    handle: H,
}

pub struct ProxyRegistry<H> {
    kind: &'static str,
    records: Mutex<HashMap<ParticipantId, ProxyRecord<H>>>,
    debug_log: RwLock<DebugLog>,
}

impl<H: ProxyHandle> ProxyRegistry<H> {
    pub fn new(kind: &'static str, debug_log: DebugLog) -> Self {
        Self {
            kind,
            records: Mutex::new(HashMap::new()),
            debug_log: RwLock::new(debug_log),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Swap the debug logging settings (between sweep cycles, via reload).
    pub fn set_debug_log(&self, debug_log: DebugLog) {
        *self.debug_log.write().unwrap_or_else(PoisonError::into_inner) = debug_log;
    }

    pub(crate) fn debug_log(&self) -> DebugLog {
        self.debug_log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<ParticipantId, ProxyRecord<H>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a proxy for `request.key`, materializing its handle through `factory`.
    ///
    /// Fails without touching the map when the key is nil, the placement has no
    /// resolvable world, a live proxy already exists for the key, or the factory fails.
    pub fn create<F>(&self, request: NewProxy, factory: F) -> Result<ProxyInfo, ProxyError>
    where
        F: FnOnce(&Location) -> Result<H, BackendError>,
    {
        if request.key.is_nil() {
            return Err(ProxyError::InvalidKey);
        }
        if request.placement.world_name().is_none() {
            return Err(ProxyError::PlacementInvalid {
                key: request.key,
                reason: "location world is null".to_string(),
            });
        }

        let mut records = self.records();
        if records.contains_key(&request.key) {
            return Err(ProxyError::DuplicateKey(request.key));
        }

        // Factory runs under the lock so two racing creations for one key
        // cannot both materialize a resource.
        let handle = factory(&request.placement)?;
        let info = ProxyInfo {
            key: request.key,
            display_label: request.label,
            placement: request.placement,
            created_at: Instant::now(),
            context_id: request.context_id,
        };
        records.insert(
            info.key,
            ProxyRecord {
                info: info.clone(),
                handle,
            },
        );
        let live = records.len();
        drop(records);

        metrics::record_proxy_created(self.kind, live);
        Ok(info)
    }

    /// Remove and release the proxy for `key`. Returns `false` if none was live.
    ///
    /// The entry is gone afterwards even if the backend fails to release it.
    pub fn remove(&self, key: &ParticipantId) -> bool {
        let Some(record) = self.records().remove(key) else {
            return false;
        };
        let label = escape_log(&record.info.display_label);
        match record.handle.release() {
            Ok(()) => {
                metrics::record_proxy_removed(self.kind);
                self.debug_log()
                    .lifecycle(&format!("{} removed for player {}", self.kind, label));
            }
            Err(e) => {
                metrics::record_release_failure(self.kind);
                error!(
                    "Failed to remove {} for player {} ({}): {}",
                    self.kind, label, key, e
                );
            }
        }
        true
    }

    /// Remove every record older than `ttl` at `now`.
    ///
    /// Candidates are collected first, so records created during the sweep are
    /// never touched and records removed concurrently are simply skipped.
    pub fn sweep_expired(&self, now: Instant, ttl: Ttl) -> Vec<ParticipantId> {
        let Ttl::Bounded(ttl) = ttl else {
            return Vec::new();
        };
        let candidates: Vec<ParticipantId> = self
            .records()
            .values()
            .filter(|r| now.saturating_duration_since(r.info.created_at) > ttl)
            .map(|r| r.info.key)
            .collect();
        let removed = self.remove_keys(candidates);
        if !removed.is_empty() {
            let count = removed.len().to_string();
            self.debug_log().lifecycle_with(
                "Cleaned up {count} expired {kind}s",
                &[("count", count.as_str()), ("kind", self.kind)],
            );
        }
        removed
    }

    /// Remove every record that belongs to `context`.
    pub fn remove_by_context(&self, context: &ContextId) -> Vec<ParticipantId> {
        let candidates: Vec<ParticipantId> = self
            .records()
            .values()
            .filter(|r| &r.info.context_id == context)
            .map(|r| r.info.key)
            .collect();
        let removed = self.remove_keys(candidates);
        if !removed.is_empty() {
            let count = removed.len().to_string();
            self.debug_log().lifecycle_with(
                "Cleaned up {count} {kind}s from arena {arena}",
                &[
                    ("count", count.as_str()),
                    ("kind", self.kind),
                    ("arena", context.as_str()),
                ],
            );
        }
        removed
    }

    /// Tear down every record. Used once at shutdown.
    pub fn remove_all(&self) -> usize {
        let keys: Vec<ParticipantId> = self.records().keys().copied().collect();
        let count = self.remove_keys(keys).len();
        debug!("{} registry teardown removed {}", self.kind, count);
        count
    }

    fn remove_keys(&self, keys: Vec<ParticipantId>) -> Vec<ParticipantId> {
        keys.into_iter().filter(|k| self.remove(k)).collect()
    }

    pub fn count(&self) -> usize {
        self.records().len()
    }

    pub fn contains(&self, key: &ParticipantId) -> bool {
        self.records().contains_key(key)
    }

    pub fn get(&self, key: &ParticipantId) -> Option<ProxyInfo> {
        self.records().get(key).map(|r| r.info.clone())
    }

    pub fn snapshot(&self) -> Vec<ProxyInfo> {
        self.records().values().map(|r| r.info.clone()).collect()
    }

    pub fn live_contexts(&self) -> Vec<ContextId> {
        let contexts: BTreeSet<ContextId> = self
            .records()
            .values()
            .map(|r| r.info.context_id.clone())
            .collect();
        contexts.into_iter().collect()
    }
}
