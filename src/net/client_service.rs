#![cfg(feature = "net")]

//! Client-facing listener: one thread per accepted client, each driving
//! the request/resolve/dispatch loop until the client disconnects.

use crate::naming::NamingCore;
use crate::net::server::{
    self, is_disconnect, is_shutdown, read_message_with_shutdown, ServerHandle,
};
use crate::net::{message_name, proxy, NetError};
use crate::router::{absorb_proxy_result, route, RouteDecision};
use crate::wire::{AckKind, AckResponse, ErrorCode, Message};
use log::{info, warn};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub struct ClientServiceConfig {
    pub bind: SocketAddr,
    /// Concurrent client connections admitted at once.
    pub max_clients: usize,
}

pub struct ClientServiceHandle {
    inner: ServerHandle,
}

impl ClientServiceHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    pub fn try_shutdown(&mut self, timeout: std::time::Duration) -> Result<(), NetError> {
        self.inner.try_shutdown(timeout)
    }
}

pub struct ClientService;

impl ClientService {
    pub fn spawn(
        config: ClientServiceConfig,
        core: Arc<NamingCore>,
    ) -> Result<ClientServiceHandle, NetError> {
        let listener = TcpListener::bind(config.bind)?;
        let handler = move |mut stream: TcpStream,
                            addr: SocketAddr,
                            shutdown: Arc<AtomicBool>|
              -> Result<(), NetError> {
            info!("event=client_accept peer={addr}");
            let result = drive_connection(&mut stream, addr, &core, &shutdown);
            info!("event=client_close peer={addr}");
            result
        };
        let inner = server::spawn_listener(
            "client_service",
            listener,
            Some(config.max_clients),
            handler,
        )?;
        Ok(ClientServiceHandle { inner })
    }
}

/// AWAIT_REQUEST → RESOLVE → {PROXY | REDIRECT | REJECT}, looping until
/// disconnect. Any failure talking to the client is fatal for this
/// connection; failures talking to a storage server during a proxy are
/// absorbed and surfaced as `Failure/Other`.
fn drive_connection(
    stream: &mut TcpStream,
    addr: SocketAddr,
    core: &NamingCore,
    shutdown: &Arc<AtomicBool>,
) -> Result<(), NetError> {
    loop {
        let message = match read_message_with_shutdown(stream, shutdown) {
            Ok(message) => message,
            Err(err) if is_disconnect(&err) || is_shutdown(&err) => return Ok(()),
            Err(err) => return Err(err),
        };
        let request = match message {
            Message::Request(request) => request,
            other => {
                warn!(
                    "event=client_unexpected_frame peer={addr} frame={}",
                    message_name(&other)
                );
                Message::Ack(AckResponse::failure(ErrorCode::InvalidInput))
                    .write_to(stream)?;
                continue;
            }
        };
        match route(core, &request) {
            RouteDecision::Reject { error } => {
                Message::Ack(AckResponse::failure(error)).write_to(stream)?;
            }
            RouteDecision::Redirect { server, address } => {
                info!(
                    "event=client_redirect peer={addr} path={} server={server}",
                    request.arg1
                );
                Message::Ack(AckResponse {
                    ack: AckKind::ConnectToServer,
                    error: ErrorCode::Success,
                })
                .write_to(stream)?;
                Message::RedirectTarget {
                    host: address.host,
                    data_port: address.data_port,
                }
                .write_to(stream)?;
            }
            RouteDecision::Proxy { server, address } => {
                Message::Ack(AckResponse {
                    ack: AckKind::Init,
                    error: ErrorCode::Success,
                })
                .write_to(stream)?;
                let final_ack = match proxy::forward(&address, &request) {
                    Ok((ack, paths)) => {
                        absorb_proxy_result(core, &request, ack, server, paths);
                        ack
                    }
                    Err(err) => {
                        warn!(
                            "event=proxy_failed peer={addr} server={server} error={err}"
                        );
                        AckResponse::failure(ErrorCode::Other)
                    }
                };
                Message::Ack(final_ack).write_to(stream)?;
            }
        }
    }
}