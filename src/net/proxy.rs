#![cfg(feature = "net")]

//! Naming-server-to-storage connection used for privileged operations.
//!
//! One short-lived connection per proxied request: forward the client's
//! request, read the storage server's ack and its refreshed path report.
//! Failures here are reported upward and absorbed by the router; they
//! never affect the server's online status (only heartbeat loss does).

use crate::net::{message_name, NetError, ProtocolError};
use crate::registry::ServerAddress;
use crate::timeouts::{PROXY_CONNECT_TIMEOUT, PROXY_DEADLINE};
use crate::wire::{AckResponse, ClientRequest, Message};
use log::debug;
use std::net::{TcpStream, ToSocketAddrs};

/// Forwards `request` to the storage server's proxy port and collects the
/// ack plus its post-operation path report.
pub fn forward(
    address: &ServerAddress,
    request: &ClientRequest,
) -> Result<(AckResponse, Vec<String>), NetError> {
    let target = format!("{}:{}", address.host, address.proxy_port);
    let resolved = target
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| ProtocolError::StorageUnreachable {
            target: target.clone(),
        })?;
    let mut stream = TcpStream::connect_timeout(&resolved, PROXY_CONNECT_TIMEOUT)?;
    stream.set_read_timeout(Some(PROXY_DEADLINE))?;
    stream.set_write_timeout(Some(PROXY_DEADLINE))?;
    debug!(
        "event=proxy_forward target={target} request={}",
        request.request_type.command_word()
    );
    Message::Request(request.clone()).write_to(&mut stream)?;
    let ack = match Message::read_from(&mut stream)? {
        Message::Ack(ack) => ack,
        other => {
            return Err(unexpected("proxy_ack", "ack", &other));
        }
    };
    let paths = match Message::read_from(&mut stream)? {
        Message::PathReport { paths, .. } => paths,
        other => {
            return Err(unexpected("proxy_path_report", "path_report", &other));
        }
    };
    Ok((ack, paths))
}

fn unexpected(context: &'static str, expected: &'static str, message: &Message) -> NetError {
    NetError::Protocol(ProtocolError::UnexpectedMessage {
        context,
        expected,
        received: message_name(message),
    })
}
