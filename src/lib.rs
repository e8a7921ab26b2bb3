//! Naming plane for a small distributed file store.
//!
//! One naming server owns the global namespace and routes every client
//! request; storage nodes own the bytes. The naming server's core is the
//! path index (a byte-keyed prefix trie), the lookup cache in front of
//! it, the server registry with heartbeat-driven liveness, the
//! redundancy tables, and the per-connection request router — each an
//! owned component behind its own mutex, composed in [`naming::NamingCore`].
//!
//! All networking is blocking and thread-per-connection; the `net`
//! feature (default) gates the socket layer, leaving the core usable on
//! its own.

pub mod cache;
pub mod client;
pub mod config;
pub mod index;
pub mod logging;
pub mod naming;
#[cfg(feature = "net")]
pub mod net;
pub mod redundancy;
pub mod registry;
pub mod router;
pub mod storage;
pub mod telemetry;
pub mod timeouts;
pub mod wire;

pub use cache::{LookupCache, DEFAULT_CACHE_CAPACITY};
pub use config::{
    load_naming_config, load_storage_config, ConfigError, NamingConfig, StorageNodeConfig,
};
pub use index::PathIndex;
pub use naming::NamingCore;
pub use redundancy::{RedundancyManager, RedundancyRecord, DEFAULT_MAX_REDUNDANCY};
pub use registry::{
    Admission, QuorumGate, RegistryError, ServerAddress, ServerId, ServerRecord, ServerRegistry,
    MAX_SERVERS,
};
pub use router::{classify, route, DataKind, PrivilegedKind, RequestClass, RouteDecision};
pub use telemetry::{MetricsRegistry, MetricsSnapshot};
pub use wire::{
    AckKind, AckResponse, ClientRequest, ErrorCode, Message, RequestType, ServerDetails,
    WireError, MAX_ARG_LEN, MAX_CHUNK_LEN,
};

#[cfg(feature = "net")]
pub use net::{
    ClientService, ClientServiceConfig, ClientServiceHandle, HeartbeatService,
    HeartbeatServiceConfig, HeartbeatServiceHandle, NetError, RegistrationService,
    RegistrationServiceConfig, RegistrationServiceHandle,
};

#[cfg(feature = "net")]
pub use storage::{StorageNode, StorageNodeError, StorageNodeHandle};
