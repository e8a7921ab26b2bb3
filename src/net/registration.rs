#![cfg(feature = "net")]

//! Registration listener: each storage server connects once, pushes its
//! `ServerDetails`, and gets a single ack back. Admission feeds the path
//! index and the redundancy tables; a rejected registration closes only
//! the offending connection.

use crate::naming::NamingCore;
use crate::net::server::{
    self, is_disconnect, is_shutdown, read_message_with_shutdown, ServerHandle,
};
use crate::net::{message_name, NetError};
use crate::registry::RegistryError;
use crate::wire::{AckResponse, ErrorCode, Message};
use log::{info, warn};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub struct RegistrationServiceConfig {
    pub bind: SocketAddr,
}

pub struct RegistrationServiceHandle {
    inner: ServerHandle,
}

impl RegistrationServiceHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    pub fn try_shutdown(&mut self, timeout: std::time::Duration) -> Result<(), NetError> {
        self.inner.try_shutdown(timeout)
    }
}

pub struct RegistrationService;

impl RegistrationService {
    pub fn spawn(
        config: RegistrationServiceConfig,
        core: Arc<NamingCore>,
    ) -> Result<RegistrationServiceHandle, NetError> {
        let listener = TcpListener::bind(config.bind)?;
        let handler = move |mut stream: TcpStream,
                            addr: SocketAddr,
                            shutdown: Arc<AtomicBool>|
              -> Result<(), NetError> {
            handle_registration(&mut stream, addr, &core, &shutdown)
        };
        let inner = server::spawn_listener("registration", listener, None, handler)?;
        Ok(RegistrationServiceHandle { inner })
    }
}

fn handle_registration(
    stream: &mut TcpStream,
    addr: SocketAddr,
    core: &NamingCore,
    shutdown: &Arc<AtomicBool>,
) -> Result<(), NetError> {
    let message = match read_message_with_shutdown(stream, shutdown) {
        Ok(message) => message,
        Err(err) if is_disconnect(&err) || is_shutdown(&err) => return Ok(()),
        Err(err) => return Err(err),
    };
    let details = match message {
        Message::ServerDetails(details) => details,
        other => {
            warn!(
                "event=registration_unexpected_frame peer={addr} frame={}",
                message_name(&other)
            );
            Message::Ack(AckResponse::failure(ErrorCode::InvalidInput)).write_to(stream)?;
            return Ok(());
        }
    };
    let server_id = details.server_id;
    match core.register(&details) {
        Ok(admission) => {
            info!(
                "event=registration_admitted peer={addr} server={server_id} \
                 previously_seen={} online_count={}",
                admission.previously_seen, admission.online_count
            );
            Message::Ack(AckResponse::success()).write_to(stream)?;
        }
        Err(err) => {
            let code = match err {
                RegistryError::AlreadyRegistered(_) => ErrorCode::ServerAlreadyRegistered,
                RegistryError::InvalidServerId(_) => ErrorCode::InvalidInput,
            };
            warn!("event=registration_rejected peer={addr} server={server_id} error={err}");
            Message::Ack(AckResponse::failure(code)).write_to(stream)?;
        }
    }
    Ok(())
}
