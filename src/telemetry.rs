//! In-process metrics for the naming server: namespaced counters and
//! gauges with a serializable snapshot for operator dumps.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug)]
pub struct MetricsRegistry {
    namespace: String,
    counters: HashMap<String, u64>,
    gauges: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, u64>,
}

impl MetricsRegistry {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            counters: HashMap::new(),
            gauges: HashMap::new(),
        }
    }

    pub fn inc_counter(&mut self, name: &str, delta: u64) -> u64 {
        let key = self.qualify(name);
        let counter = self.counters.entry(key).or_insert(0);
        *counter = counter.saturating_add(delta);
        *counter
    }

    pub fn set_gauge(&mut self, name: &str, value: u64) {
        let key = self.qualify(name);
        self.gauges.insert(key, value);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.clone(),
            gauges: self.gauges.clone(),
        }
    }

    fn qualify(&self, name: &str) -> String {
        format!("{}.{}", self.namespace, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_under_namespace() {
        let mut metrics = MetricsRegistry::new("nameplane");
        metrics.inc_counter("router.redirected", 1);
        metrics.inc_counter("router.redirected", 2);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.counters.get("nameplane.router.redirected"), Some(&3));
    }

    #[test]
    fn gauges_overwrite() {
        let mut metrics = MetricsRegistry::new("nameplane");
        metrics.set_gauge("servers.online", 3);
        metrics.set_gauge("servers.online", 2);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.gauges.get("nameplane.servers.online"), Some(&2));
    }

    #[test]
    fn snapshot_serializes() {
        let mut metrics = MetricsRegistry::new("nameplane");
        metrics.inc_counter("cache.hits", 5);
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("nameplane.cache.hits"));
    }
}
