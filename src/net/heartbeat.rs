#![cfg(feature = "net")]

//! Heartbeat listener: one long-lived connection per storage server,
//! used exclusively to detect liveness.
//!
//! The server announces its id once, then sends a liveness token on a
//! fixed cadence. The handler blocks reading the link; an orderly close
//! or any socket error is the one and only trigger that marks the server
//! offline and cascades into replica repair. A process shutdown does not
//! count as liveness loss.

use crate::naming::NamingCore;
use crate::net::server::{
    self, is_disconnect, is_shutdown, read_message_with_shutdown, ServerHandle,
};
use crate::net::{message_name, NetError};
use crate::registry::ServerId;
use crate::wire::Message;
use log::{debug, info, warn};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub struct HeartbeatServiceConfig {
    pub bind: SocketAddr,
}

pub struct HeartbeatServiceHandle {
    inner: ServerHandle,
}

impl HeartbeatServiceHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    pub fn try_shutdown(&mut self, timeout: std::time::Duration) -> Result<(), NetError> {
        self.inner.try_shutdown(timeout)
    }
}

pub struct HeartbeatService;

impl HeartbeatService {
    pub fn spawn(
        config: HeartbeatServiceConfig,
        core: Arc<NamingCore>,
    ) -> Result<HeartbeatServiceHandle, NetError> {
        let listener = TcpListener::bind(config.bind)?;
        let handler = move |mut stream: TcpStream,
                            addr: SocketAddr,
                            shutdown: Arc<AtomicBool>|
              -> Result<(), NetError> {
            watch_link(&mut stream, addr, &core, &shutdown)
        };
        let inner = server::spawn_listener("heartbeat", listener, None, handler)?;
        Ok(HeartbeatServiceHandle { inner })
    }
}

fn watch_link(
    stream: &mut TcpStream,
    addr: SocketAddr,
    core: &NamingCore,
    shutdown: &Arc<AtomicBool>,
) -> Result<(), NetError> {
    let server_id = match read_message_with_shutdown(stream, shutdown) {
        Ok(Message::HeartbeatHello { server_id }) => server_id,
        Ok(other) => {
            warn!(
                "event=heartbeat_unexpected_frame peer={addr} frame={}",
                message_name(&other)
            );
            return Ok(());
        }
        Err(err) if is_disconnect(&err) || is_shutdown(&err) => return Ok(()),
        Err(err) => return Err(err),
    };
    info!("event=heartbeat_link_up peer={addr} server={server_id}");
    core.inc_metric("heartbeat.link_up");
    loop {
        match read_message_with_shutdown(stream, shutdown) {
            Ok(Message::HeartbeatPing { server_id: sender }) => {
                if sender != server_id {
                    warn!(
                        "event=heartbeat_id_mismatch peer={addr} expected={server_id} got={sender}"
                    );
                }
                debug!("event=heartbeat_ping server={server_id}");
            }
            Ok(other) => {
                // Anything else on the liveness link means the peer is
                // confused; treat it like a broken link.
                warn!(
                    "event=heartbeat_bad_frame peer={addr} server={server_id} frame={}",
                    message_name(&other)
                );
                link_down(core, server_id);
                return Ok(());
            }
            Err(err) if is_shutdown(&err) => return Ok(()),
            Err(err) => {
                if !is_disconnect(&err) {
                    warn!(
                        "event=heartbeat_link_error peer={addr} server={server_id} error={err}"
                    );
                }
                link_down(core, server_id);
                return Ok(());
            }
        }
    }
}

fn link_down(core: &NamingCore, server_id: ServerId) {
    info!("event=heartbeat_link_down server={server_id}");
    core.heartbeat_lost(server_id);
}
