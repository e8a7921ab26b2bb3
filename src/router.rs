//! Request classification and the per-request routing decision.
//!
//! Every accepted client connection loops through
//! `AWAIT_REQUEST → RESOLVE → {PROXY | REDIRECT | REJECT}`; the socket
//! driver lives in `net::client_service`, while the decision itself is
//! pure and lives here so it can be tested without a wire.

use crate::naming::NamingCore;
use crate::registry::{ServerAddress, ServerId};
use crate::wire::{AckResponse, ClientRequest, ErrorCode, RequestType};

/// Namespace-mutating operations the naming server proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegedKind {
    CreateFile,
    CreateDir,
    DeleteFile,
    DeleteDir,
}

/// Data-path operations the naming server only redirects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    ReadFile,
    WriteFile,
    FileInfo,
    ListAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Privileged(PrivilegedKind),
    NonPrivileged(DataKind),
}

/// Exhaustive: adding a request kind is a compile-time decision, not a
/// silent fallthrough.
pub fn classify(request_type: RequestType) -> RequestClass {
    match request_type {
        RequestType::CreateFile => RequestClass::Privileged(PrivilegedKind::CreateFile),
        RequestType::CreateDir => RequestClass::Privileged(PrivilegedKind::CreateDir),
        RequestType::DeleteFile => RequestClass::Privileged(PrivilegedKind::DeleteFile),
        RequestType::DeleteDir => RequestClass::Privileged(PrivilegedKind::DeleteDir),
        RequestType::ReadFile => RequestClass::NonPrivileged(DataKind::ReadFile),
        RequestType::WriteFile => RequestClass::NonPrivileged(DataKind::WriteFile),
        RequestType::FileInfo => RequestClass::NonPrivileged(DataKind::FileInfo),
        RequestType::ListAll => RequestClass::NonPrivileged(DataKind::ListAll),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Tell the client to open a direct data connection.
    Redirect {
        server: ServerId,
        address: ServerAddress,
    },
    /// The naming server forwards the request itself.
    Proxy {
        server: ServerId,
        address: ServerAddress,
    },
    /// Per-request rejection; the client connection stays usable.
    Reject { error: ErrorCode },
}

/// Resolves the request's path and classifies the operation. Rejection
/// reasons, in order: unresolvable path (`WrongPath`), owner currently
/// offline (`ServerOffline`).
pub fn route(core: &NamingCore, request: &ClientRequest) -> RouteDecision {
    let Some(server) = core.resolve(&request.arg1) else {
        core.inc_metric("router.rejected");
        return RouteDecision::Reject {
            error: ErrorCode::WrongPath,
        };
    };
    let Some(address) = core.server_address(server) else {
        // The index can hold ids the registry never admitted only if a
        // peer lied; treat it the same as an unknown path.
        core.inc_metric("router.rejected");
        return RouteDecision::Reject {
            error: ErrorCode::WrongPath,
        };
    };
    if !core.is_online(server) {
        core.inc_metric("router.rejected");
        return RouteDecision::Reject {
            error: ErrorCode::ServerOffline,
        };
    }
    match classify(request.request_type) {
        RequestClass::NonPrivileged(_) => {
            core.inc_metric("router.redirected");
            RouteDecision::Redirect { server, address }
        }
        RequestClass::Privileged(_) => {
            core.inc_metric("router.proxied");
            RouteDecision::Proxy { server, address }
        }
    }
}

/// Folds a completed proxy exchange back into the core: a successful
/// delete tombstones its exact target, and the storage server's refreshed
/// path report is applied wholesale (insert-only, see `refresh_paths`).
pub fn absorb_proxy_result(
    core: &NamingCore,
    request: &ClientRequest,
    ack: AckResponse,
    server: ServerId,
    reported_paths: Vec<String>,
) {
    if ack.error == ErrorCode::Success {
        if let RequestClass::Privileged(kind) = classify(request.request_type) {
            match kind {
                PrivilegedKind::DeleteFile | PrivilegedKind::DeleteDir => {
                    core.delete_path(&request.arg1);
                }
                PrivilegedKind::CreateFile | PrivilegedKind::CreateDir => {}
            }
        }
    }
    core.refresh_paths(server, reported_paths);
}
