//! Replica-peer bookkeeping for the storage fleet.
//!
//! Every server carries a bounded set of `active` replica peers plus the
//! history of peers that dropped out (`inactive`). The manager repairs
//! the topology on registration and heartbeat-loss events; it is not
//! polled. No data moves here — this is liveness bookkeeping only.

use crate::registry::ServerId;
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::{BTreeMap, BTreeSet};

/// Default replica quota per server.
pub const DEFAULT_MAX_REDUNDANCY: usize = 2;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RedundancyRecord {
    /// Peers currently backing this server, at most the quota.
    pub active: BTreeSet<ServerId>,
    /// Peers that were active but went offline or rotated out. Disjoint
    /// from `active` at all times.
    pub inactive: BTreeSet<ServerId>,
}

pub struct RedundancyManager {
    quota: usize,
    records: BTreeMap<ServerId, RedundancyRecord>,
}

impl RedundancyManager {
    pub fn new(quota: usize) -> Self {
        Self {
            quota,
            records: BTreeMap::new(),
        }
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    pub fn record(&self, id: ServerId) -> Option<&RedundancyRecord> {
        self.records.get(&id)
    }

    /// Tops up `id`'s active set to the quota from the currently online
    /// servers, drawing uniformly at random without replacement. Proceeds
    /// with fewer when candidates run out; never blocks waiting for more.
    pub fn assign_replicas(&mut self, id: ServerId, online: &[ServerId]) {
        let record = self.records.entry(id).or_default();
        if record.active.len() >= self.quota {
            return;
        }
        let mut candidates: Vec<ServerId> = online
            .iter()
            .copied()
            .filter(|peer| *peer != id && !record.active.contains(peer))
            .collect();
        candidates.shuffle(&mut thread_rng());
        for peer in candidates {
            if record.active.len() >= self.quota {
                break;
            }
            record.inactive.remove(&peer);
            record.active.insert(peer);
        }
        if record.active.len() < self.quota {
            debug!(
                "event=replicas_short server={id} active={} quota={}",
                record.active.len(),
                self.quota
            );
        }
        info!(
            "event=replicas_assigned server={id} active={:?}",
            record.active.iter().map(|peer| peer.raw()).collect::<Vec<_>>()
        );
    }

    /// Heartbeat loss for `lost`: every server backed by it moves the
    /// peer to its inactive history and immediately tops back up from
    /// `online` (which no longer contains `lost`).
    pub fn server_went_offline(&mut self, lost: ServerId, online: &[ServerId]) {
        let mut to_repair = Vec::new();
        for (server, record) in self.records.iter_mut() {
            if record.active.remove(&lost) {
                record.inactive.insert(lost);
                to_repair.push(*server);
            }
        }
        for server in to_repair {
            self.assign_replicas(server, online);
        }
    }

    /// Registration repair. A previously seen server becomes a valid
    /// candidate again (purged from every inactive history) and anyone
    /// under quota tops up; a first appearance only gets its own replicas,
    /// and only once the initial quorum has been reached.
    pub fn server_came_online(
        &mut self,
        id: ServerId,
        previously_seen: bool,
        quorum_reached: bool,
        online: &[ServerId],
    ) {
        if previously_seen {
            for record in self.records.values_mut() {
                record.inactive.remove(&id);
            }
            self.assign_all_under_quota(online);
        } else {
            self.records.entry(id).or_default();
            if quorum_reached {
                self.assign_replicas(id, online);
            }
        }
    }

    /// Tops up every online server below quota. Also the initial
    /// assignment pass when the startup quorum is first reached.
    pub fn assign_all_under_quota(&mut self, online: &[ServerId]) {
        for id in online {
            let under_quota = self
                .records
                .get(id)
                .map_or(true, |record| record.active.len() < self.quota);
            if under_quota {
                self.assign_replicas(*id, online);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u16) -> ServerId {
        ServerId::new(raw)
    }

    fn ids(raws: &[u16]) -> Vec<ServerId> {
        raws.iter().copied().map(ServerId::new).collect()
    }

    fn check_invariants(manager: &RedundancyManager) {
        for (server, record) in &manager.records {
            assert!(record.active.len() <= manager.quota);
            assert!(!record.active.contains(server));
            assert!(record.active.is_disjoint(&record.inactive));
        }
    }

    #[test]
    fn quota_respected_with_plenty_of_candidates() {
        let mut manager = RedundancyManager::new(2);
        let online = ids(&[0, 1, 2, 3, 4]);
        for server in &online {
            manager.assign_replicas(*server, &online);
        }
        for server in &online {
            assert_eq!(manager.record(*server).unwrap().active.len(), 2);
        }
        check_invariants(&manager);
    }

    #[test]
    fn proceeds_short_when_candidates_exhausted() {
        let mut manager = RedundancyManager::new(3);
        let online = ids(&[0, 1]);
        manager.assign_replicas(id(0), &online);
        let record = manager.record(id(0)).unwrap();
        assert_eq!(record.active.len(), 1);
        assert!(record.active.contains(&id(1)));
        check_invariants(&manager);
    }

    #[test]
    fn never_its_own_replica() {
        let mut manager = RedundancyManager::new(5);
        let online = ids(&[0, 1, 2]);
        for server in &online {
            manager.assign_replicas(*server, &online);
        }
        check_invariants(&manager);
    }

    #[test]
    fn assign_is_idempotent_at_quota() {
        let mut manager = RedundancyManager::new(2);
        let online = ids(&[0, 1, 2]);
        manager.assign_replicas(id(0), &online);
        let before = manager.record(id(0)).unwrap().clone();
        manager.assign_replicas(id(0), &online);
        assert_eq!(manager.record(id(0)).unwrap(), &before);
    }

    #[test]
    fn offline_cascade_moves_peer_and_tops_up() {
        let mut manager = RedundancyManager::new(1);
        let online = ids(&[0, 1, 2]);
        for server in &online {
            manager.assign_replicas(*server, &online);
        }
        // Find a server backed by 0, then take 0 away.
        let backed_by_zero: Vec<ServerId> = manager
            .records
            .iter()
            .filter(|(_, record)| record.active.contains(&id(0)))
            .map(|(server, _)| *server)
            .collect();
        let remaining = ids(&[1, 2]);
        manager.server_went_offline(id(0), &remaining);
        for server in backed_by_zero {
            let record = manager.record(server).unwrap();
            assert!(!record.active.contains(&id(0)));
            assert!(record.inactive.contains(&id(0)));
            // A replacement was drawn from the survivors.
            assert_eq!(record.active.len(), 1);
        }
        check_invariants(&manager);
    }

    #[test]
    fn returning_server_is_purged_from_inactive_histories() {
        let mut manager = RedundancyManager::new(1);
        let online = ids(&[0, 1, 2]);
        for server in &online {
            manager.assign_replicas(*server, &online);
        }
        let remaining = ids(&[1, 2]);
        manager.server_went_offline(id(0), &remaining);
        let back = ids(&[0, 1, 2]);
        manager.server_came_online(id(0), true, true, &back);
        for record in manager.records.values() {
            assert!(!record.inactive.contains(&id(0)));
        }
        check_invariants(&manager);
    }

    #[test]
    fn first_appearance_before_quorum_gets_no_replicas() {
        let mut manager = RedundancyManager::new(2);
        manager.server_came_online(id(0), false, false, &ids(&[0]));
        assert!(manager.record(id(0)).unwrap().active.is_empty());
    }

    #[test]
    fn first_appearance_after_quorum_gets_replicas() {
        let mut manager = RedundancyManager::new(2);
        let online = ids(&[0, 1, 2, 3]);
        manager.assign_all_under_quota(&online);
        manager.server_came_online(id(4), false, true, &ids(&[0, 1, 2, 3, 4]));
        assert_eq!(manager.record(id(4)).unwrap().active.len(), 2);
        check_invariants(&manager);
    }
}
