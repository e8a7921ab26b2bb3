//! The naming server's process-wide component set.
//!
//! One instance of [`NamingCore`] owns the path index, lookup cache,
//! server registry, redundancy tables, and metrics, each behind its own
//! mutex. Everything else in the crate goes through these accessors; no
//! lock is ever held across a blocking network call, and locks are always
//! taken in registry → index → redundancy → metrics order.

use crate::cache::{CacheStats, LookupCache};
use crate::index::PathIndex;
use crate::redundancy::RedundancyManager;
use crate::registry::{
    Admission, QuorumGate, RegistryError, ServerAddress, ServerId, ServerRegistry,
};
use crate::telemetry::{MetricsRegistry, MetricsSnapshot};
use crate::wire::ServerDetails;
use log::{info, warn};
use parking_lot::Mutex;

pub struct NamingCore {
    index: Mutex<PathIndex>,
    cache: Mutex<LookupCache>,
    registry: Mutex<ServerRegistry>,
    redundancy: Mutex<RedundancyManager>,
    metrics: Mutex<MetricsRegistry>,
    gate: QuorumGate,
}

impl NamingCore {
    /// `init_servers` is the registration quorum that opens the client
    /// gate; `replica_quota` bounds each server's active replica set.
    pub fn new(init_servers: usize, replica_quota: usize, cache_capacity: usize) -> Self {
        Self {
            index: Mutex::new(PathIndex::new()),
            cache: Mutex::new(LookupCache::new(cache_capacity)),
            registry: Mutex::new(ServerRegistry::new()),
            redundancy: Mutex::new(RedundancyManager::new(replica_quota)),
            metrics: Mutex::new(MetricsRegistry::new("nameplane")),
            gate: QuorumGate::new(init_servers),
        }
    }

    /// The one-shot startup barrier; client listeners wait on it.
    pub fn gate(&self) -> &QuorumGate {
        &self.gate
    }

    /// Resolves a path to its owning server through the cache.
    pub fn resolve(&self, path: &str) -> Option<ServerId> {
        let mut cache = self.cache.lock();
        let index = self.index.lock();
        cache.resolve(path, &index)
    }

    /// Admits a storage server: registry slot, bulk path insert, replica
    /// repair, and — when the threshold is first crossed — the quorum
    /// signal plus the initial replica assignment pass.
    pub fn register(&self, details: &ServerDetails) -> Result<Admission, RegistryError> {
        let (admission, online) = {
            let mut registry = self.registry.lock();
            let admission = registry.register(details)?;
            (admission, registry.online_ids())
        };
        {
            let mut index = self.index.lock();
            for path in &details.paths {
                index.insert(path, details.server_id);
            }
        }
        {
            let mut redundancy = self.redundancy.lock();
            let quorum_reached =
                self.gate.is_open() || admission.online_count >= self.gate.threshold();
            redundancy.server_came_online(
                details.server_id,
                admission.previously_seen,
                quorum_reached,
                &online,
            );
            if !self.gate.is_open() && admission.online_count >= self.gate.threshold() {
                self.gate.open();
                redundancy.assign_all_under_quota(&online);
            }
        }
        self.publish_server_gauge(admission.online_count);
        Ok(admission)
    }

    /// Heartbeat-link loss: the sole trigger for marking a server offline.
    /// Cascades into replica repair for everyone the server was backing.
    pub fn heartbeat_lost(&self, id: ServerId) {
        let (was_online, online, online_count) = {
            let mut registry = self.registry.lock();
            let was_online = registry.mark_offline(id);
            (was_online, registry.online_ids(), registry.online_count())
        };
        if !was_online {
            warn!("event=heartbeat_lost_unknown server={id}");
            return;
        }
        info!("event=heartbeat_lost server={id}");
        self.redundancy.lock().server_went_offline(id, &online);
        self.publish_server_gauge(online_count);
    }

    /// Applies a storage server's post-mutation self-report: the registry
    /// copy is replaced wholesale and every reported path is re-inserted.
    /// Paths that vanished from the report are deliberately not diffed
    /// out; only explicit deletes tombstone (see `delete_path`).
    pub fn refresh_paths(&self, id: ServerId, paths: Vec<String>) {
        {
            let mut index = self.index.lock();
            for path in &paths {
                index.insert(path, id);
            }
        }
        self.registry.lock().refresh_paths(id, paths);
    }

    /// Tombstones the exact path after a successful privileged delete.
    pub fn delete_path(&self, path: &str) -> bool {
        self.index.lock().delete(path)
    }

    pub fn is_online(&self, id: ServerId) -> bool {
        self.registry.lock().is_online(id)
    }

    pub fn server_address(&self, id: ServerId) -> Option<ServerAddress> {
        self.registry.lock().address(id)
    }

    pub fn online_count(&self) -> usize {
        self.registry.lock().online_count()
    }

    pub fn replica_record(&self, id: ServerId) -> Option<crate::redundancy::RedundancyRecord> {
        self.redundancy.lock().record(id).cloned()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    pub fn inc_metric(&self, name: &str) {
        self.metrics.lock().inc_counter(name, 1);
    }

    /// Publishes derived gauges and returns the full snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let stats = self.cache_stats();
        let online = self.online_count();
        let mut metrics = self.metrics.lock();
        metrics.set_gauge("cache.hits", stats.hits);
        metrics.set_gauge("cache.misses", stats.misses);
        metrics.set_gauge("servers.online", online as u64);
        metrics.snapshot()
    }

    fn publish_server_gauge(&self, online_count: usize) {
        self.metrics
            .lock()
            .set_gauge("servers.online", online_count as u64);
    }
}
