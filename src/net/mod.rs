#![cfg(feature = "net")]

//! Blocking TCP services of the naming server, plus the proxy client it
//! uses to reach storage servers. Everything here is thread-per-
//! connection; no call holds a core lock while touching a socket.

use crate::wire::WireError;
use thiserror::Error;

pub mod client_service;
pub mod heartbeat;
pub mod proxy;
pub mod registration;
pub(crate) mod server;

pub use client_service::{ClientService, ClientServiceConfig, ClientServiceHandle};
pub use heartbeat::{HeartbeatService, HeartbeatServiceConfig, HeartbeatServiceHandle};
pub use registration::{
    RegistrationService, RegistrationServiceConfig, RegistrationServiceHandle,
};

/// Errors emitted by the built-in networking helpers.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unexpected {received} frame while waiting for {expected} ({context})")]
    UnexpectedMessage {
        context: &'static str,
        expected: &'static str,
        received: &'static str,
    },
    #[error("{context} server shutdown timed out")]
    ShutdownTimeout { context: &'static str },
    #[error("storage server at {target} unreachable")]
    StorageUnreachable { target: String },
}

pub(crate) fn message_name(message: &crate::wire::Message) -> &'static str {
    use crate::wire::Message;
    match message {
        Message::Request(_) => "request",
        Message::Ack(_) => "ack",
        Message::RedirectTarget { .. } => "redirect_target",
        Message::ServerDetails(_) => "server_details",
        Message::PathReport { .. } => "path_report",
        Message::HeartbeatHello { .. } => "heartbeat_hello",
        Message::HeartbeatPing { .. } => "heartbeat_ping",
        Message::FileChunk { .. } => "file_chunk",
        Message::InfoText { .. } => "info_text",
    }
}
