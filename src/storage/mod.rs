//! Storage-node side of the system: the local filesystem backend, the
//! startup path scan, and (with the `net` feature) the serving loops
//! that face the naming server and clients.

mod ops;
mod scan;

#[cfg(feature = "net")]
mod node;

pub use ops::{StorageBackend, StorageOpError};
pub use scan::scan_paths;

#[cfg(feature = "net")]
pub use node::{StorageNode, StorageNodeError, StorageNodeHandle};
