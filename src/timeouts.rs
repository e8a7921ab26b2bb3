//! Centralized timing policy.
//!
//! Keeping every knob in one place makes it obvious which parts of the
//! system share behaviour and gives a single place to tighten or relax
//! limits. Liveness itself is edge-triggered by connection loss, never by
//! a timer: the short poll interval below only lets blocked readers
//! notice a shutdown request.

use std::time::Duration;

/// Cadence at which a storage node sends liveness tokens.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Socket read timeout used purely as a shutdown poll on blocking reads.
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Backoff between accept attempts on a nonblocking listener.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
/// Grace period granted to listener threads when asked to shut down.
pub const SERVER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Deadline for the whole proxied exchange with a storage server.
pub const PROXY_DEADLINE: Duration = Duration::from_secs(30);
/// Connect timeout for naming-server-to-storage proxy connections.
pub const PROXY_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
