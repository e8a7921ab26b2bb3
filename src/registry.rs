//! Registry of known storage servers and their liveness.
//!
//! A fixed table of slots indexed by the stable server id. A server's
//! slot survives its heartbeat link going away: only `online` flips, so a
//! re-registration is distinguishable from a first appearance.

use crate::wire::ServerDetails;
use log::info;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Size of the server table; ids must fall below this.
pub const MAX_SERVERS: usize = 10;

/// Stable identifier of a storage server, assigned by its operator and
/// used as the slot index in the registry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerId(u16);

impl ServerId {
    pub fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ss-{}", self.0)
    }
}

/// Where a storage server can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    /// Port the naming server proxies privileged operations to.
    pub proxy_port: u16,
    /// Port clients connect to directly for data operations.
    pub data_port: u16,
}

#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub id: ServerId,
    pub address: ServerAddress,
    pub online: bool,
    /// Complete path list as last self-reported; wholesale replaced after
    /// every privileged operation.
    pub path_list: Vec<String>,
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether this id held a slot before (a re-registration after
    /// heartbeat loss) as opposed to a first appearance.
    pub previously_seen: bool,
    pub online_count: usize,
}

pub struct ServerRegistry {
    slots: Vec<Option<ServerRecord>>,
    online_count: usize,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_SERVERS).map(|_| None).collect(),
            online_count: 0,
        }
    }

    /// Admits a server. Rejects ids outside the table and ids whose slot
    /// is still marked online (the first registration stays untouched).
    pub fn register(&mut self, details: &ServerDetails) -> Result<Admission, RegistryError> {
        let id = details.server_id;
        if id.index() >= MAX_SERVERS {
            return Err(RegistryError::InvalidServerId(id));
        }
        let slot = &mut self.slots[id.index()];
        if slot.as_ref().is_some_and(|record| record.online) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        let previously_seen = slot.is_some();
        *slot = Some(ServerRecord {
            id,
            address: ServerAddress {
                host: details.host.clone(),
                proxy_port: details.proxy_port,
                data_port: details.data_port,
            },
            online: true,
            path_list: details.paths.clone(),
        });
        self.online_count += 1;
        info!(
            "event=server_registered server={id} paths={} online_count={}",
            details.paths.len(),
            self.online_count
        );
        Ok(Admission {
            previously_seen,
            online_count: self.online_count,
        })
    }

    /// Flips a server offline after heartbeat loss. Returns false if the
    /// server was unknown or already offline.
    pub fn mark_offline(&mut self, id: ServerId) -> bool {
        let Some(record) = self.record_mut(id) else {
            return false;
        };
        if !record.online {
            return false;
        }
        record.online = false;
        self.online_count -= 1;
        info!(
            "event=server_offline server={id} online_count={}",
            self.online_count
        );
        true
    }

    /// Wholesale replacement of a server's self-reported path list.
    pub fn refresh_paths(&mut self, id: ServerId, paths: Vec<String>) -> bool {
        match self.record_mut(id) {
            Some(record) => {
                record.path_list = paths;
                true
            }
            None => false,
        }
    }

    pub fn record(&self, id: ServerId) -> Option<&ServerRecord> {
        self.slots.get(id.index()).and_then(|slot| slot.as_ref())
    }

    pub fn is_online(&self, id: ServerId) -> bool {
        self.record(id).is_some_and(|record| record.online)
    }

    pub fn address(&self, id: ServerId) -> Option<ServerAddress> {
        self.record(id).map(|record| record.address.clone())
    }

    pub fn online_count(&self) -> usize {
        self.online_count
    }

    pub fn online_ids(&self) -> Vec<ServerId> {
        self.slots
            .iter()
            .flatten()
            .filter(|record| record.online)
            .map(|record| record.id)
            .collect()
    }

    fn record_mut(&mut self, id: ServerId) -> Option<&mut ServerRecord> {
        self.slots.get_mut(id.index()).and_then(|slot| slot.as_mut())
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("server id {0} is outside the registry table")]
    InvalidServerId(ServerId),
    #[error("server {0} is already registered and online")]
    AlreadyRegistered(ServerId),
}

/// One-shot startup barrier: client traffic waits here until the
/// configured minimum number of storage servers has registered.
pub struct QuorumGate {
    threshold: usize,
    opened: Mutex<bool>,
    condvar: Condvar,
}

impl QuorumGate {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            opened: Mutex::new(threshold == 0),
            condvar: Condvar::new(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Opens the gate. Signalled once, when the threshold is first
    /// reached; later calls are no-ops and the gate never closes again.
    pub fn open(&self) {
        let mut opened = self.opened.lock();
        if !*opened {
            *opened = true;
            info!(
                "event=quorum_reached init_servers={} accepting_clients=true",
                self.threshold
            );
            self.condvar.notify_all();
        }
    }

    pub fn is_open(&self) -> bool {
        *self.opened.lock()
    }

    /// Blocks until the gate opens.
    pub fn wait(&self) {
        let mut opened = self.opened.lock();
        while !*opened {
            self.condvar.wait(&mut opened);
        }
    }

    /// Blocks until the gate opens or the timeout elapses. Returns whether
    /// the gate is open.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut opened = self.opened.lock();
        if *opened {
            return true;
        }
        self.condvar.wait_for(&mut opened, timeout);
        *opened
    }
}
