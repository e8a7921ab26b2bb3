#![cfg(feature = "net")]

//! Storage-node process: registers with the naming server, keeps the
//! liveness link fed, executes proxied privileged operations, and serves
//! direct client data connections.

use crate::config::StorageNodeConfig;
use crate::net::server::{
    self, is_disconnect, is_shutdown, read_message_with_shutdown, ServerHandle,
};
use crate::net::{message_name, NetError};
use crate::registry::ServerId;
use crate::router::{classify, DataKind, PrivilegedKind, RequestClass};
use crate::storage::{scan_paths, StorageBackend, StorageOpError};
use crate::timeouts::HEARTBEAT_INTERVAL;
use crate::wire::{
    AckKind, AckResponse, ClientRequest, ErrorCode, Message, ServerDetails, MAX_CHUNK_LEN,
};
use log::{info, warn};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use thiserror::Error;

pub struct StorageNode;

pub struct StorageNodeHandle {
    nm_service: ServerHandle,
    data_service: ServerHandle,
    heartbeat_stop: Arc<AtomicBool>,
    heartbeat: Option<thread::JoinHandle<()>>,
}

impl StorageNodeHandle {
    pub fn proxy_addr(&self) -> SocketAddr {
        self.nm_service.local_addr()
    }

    pub fn data_addr(&self) -> SocketAddr {
        self.data_service.local_addr()
    }

    pub fn shutdown(&mut self) {
        self.heartbeat_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.heartbeat.take() {
            let _ = handle.join();
        }
        let _ = self
            .nm_service
            .try_shutdown(crate::timeouts::SERVER_SHUTDOWN_GRACE);
        let _ = self
            .data_service
            .try_shutdown(crate::timeouts::SERVER_SHUTDOWN_GRACE);
    }
}

impl Drop for StorageNodeHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl StorageNode {
    /// Scans the export root, binds both serving ports, registers with
    /// the naming server, and starts the heartbeat loop.
    pub fn run(config: StorageNodeConfig) -> Result<StorageNodeHandle, StorageNodeError> {
        let server_id = ServerId::new(config.server_id);
        let backend = Arc::new(StorageBackend::new(&config.root));
        let paths = scan_paths(backend.root()).map_err(StorageOpError::Io)?;
        info!(
            "event=storage_scan server={server_id} root={} paths={}",
            config.root.display(),
            paths.len()
        );

        let nm_listener = TcpListener::bind(config.proxy_bind())?;
        let data_listener = TcpListener::bind(config.data_bind())?;
        let advertised_proxy = nm_listener.local_addr()?.port();
        let advertised_data = data_listener.local_addr()?.port();

        let details = ServerDetails {
            server_id,
            host: config.advertise_host.clone(),
            proxy_port: advertised_proxy,
            data_port: advertised_data,
            online: false,
            paths,
        };
        register(&config.registration_target(), &details)?;

        let nm_backend = backend.clone();
        let nm_service = server::spawn_listener("storage_nm", nm_listener, None, {
            move |mut stream: TcpStream, addr: SocketAddr, shutdown: Arc<AtomicBool>| {
                serve_naming(&mut stream, addr, server_id, &nm_backend, &shutdown)
            }
        })?;
        let data_backend = backend.clone();
        let data_service = server::spawn_listener("storage_data", data_listener, None, {
            move |mut stream: TcpStream, addr: SocketAddr, shutdown: Arc<AtomicBool>| {
                serve_client(&mut stream, addr, &data_backend, &shutdown)
            }
        })?;

        let heartbeat_stop = Arc::new(AtomicBool::new(false));
        let heartbeat = spawn_heartbeat(
            config.heartbeat_target(),
            server_id,
            heartbeat_stop.clone(),
        );
        Ok(StorageNodeHandle {
            nm_service,
            data_service,
            heartbeat_stop,
            heartbeat: Some(heartbeat),
        })
    }
}

fn register(target: &str, details: &ServerDetails) -> Result<(), StorageNodeError> {
    let mut stream = TcpStream::connect(target)?;
    Message::ServerDetails(details.clone()).write_to(&mut stream)?;
    match Message::read_from(&mut stream)? {
        Message::Ack(ack) if ack.ack == AckKind::Success => {
            info!(
                "event=storage_registered server={} naming={target}",
                details.server_id
            );
            Ok(())
        }
        Message::Ack(ack) => Err(StorageNodeError::Rejected(ack.error)),
        other => Err(StorageNodeError::UnexpectedFrame(message_name(&other))),
    }
}

/// Announces the node's id once, then feeds the liveness link until told
/// to stop. A broken link ends the loop: the naming server has already
/// marked this node offline, and recovery is a fresh registration.
fn spawn_heartbeat(
    target: String,
    server_id: ServerId,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut stream = match TcpStream::connect(&target) {
            Ok(stream) => stream,
            Err(err) => {
                warn!("event=heartbeat_connect_failed server={server_id} error={err}");
                return;
            }
        };
        if let Err(err) = (Message::HeartbeatHello { server_id }).write_to(&mut stream) {
            warn!("event=heartbeat_hello_failed server={server_id} error={err}");
            return;
        }
        info!("event=heartbeat_started server={server_id} naming={target}");
        loop {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            if let Err(err) = (Message::HeartbeatPing { server_id }).write_to(&mut stream) {
                warn!("event=heartbeat_send_failed server={server_id} error={err}");
                return;
            }
            let mut slept = std::time::Duration::ZERO;
            let step = std::time::Duration::from_millis(200);
            while slept < HEARTBEAT_INTERVAL {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                thread::sleep(step);
                slept += step;
            }
        }
    })
}

/// Serves the naming server's proxied privileged operations: execute,
/// ack, then report the refreshed path list.
fn serve_naming(
    stream: &mut TcpStream,
    addr: SocketAddr,
    server_id: ServerId,
    backend: &StorageBackend,
    shutdown: &Arc<AtomicBool>,
) -> Result<(), NetError> {
    loop {
        let request = match read_message_with_shutdown(stream, shutdown) {
            Ok(Message::Request(request)) => request,
            Ok(other) => {
                warn!(
                    "event=storage_nm_unexpected_frame peer={addr} frame={}",
                    message_name(&other)
                );
                Message::Ack(AckResponse::failure(ErrorCode::InvalidInput)).write_to(stream)?;
                continue;
            }
            Err(err) if is_disconnect(&err) || is_shutdown(&err) => return Ok(()),
            Err(err) => return Err(err),
        };
        let ack = match execute_privileged(backend, &request) {
            Ok(()) => AckResponse::success(),
            Err(err) => {
                warn!(
                    "event=storage_op_failed op={} path={} error={err}",
                    request.request_type.command_word(),
                    request.arg1
                );
                AckResponse::failure(op_error_code(&err))
            }
        };
        Message::Ack(ack).write_to(stream)?;
        let paths = match scan_paths(backend.root()) {
            Ok(paths) => paths,
            Err(err) => {
                warn!("event=storage_rescan_failed error={err}");
                Vec::new()
            }
        };
        Message::PathReport { server_id, paths }.write_to(stream)?;
    }
}

fn execute_privileged(
    backend: &StorageBackend,
    request: &ClientRequest,
) -> Result<(), StorageOpError> {
    match classify(request.request_type) {
        RequestClass::Privileged(kind) => match kind {
            PrivilegedKind::CreateFile => backend.create_file(&request.arg1, &request.arg2),
            PrivilegedKind::CreateDir => backend.create_dir(&request.arg1, &request.arg2),
            PrivilegedKind::DeleteFile => backend.delete_file(&request.arg1),
            PrivilegedKind::DeleteDir => backend.delete_dir(&request.arg1),
        },
        RequestClass::NonPrivileged(_) => {
            Err(StorageOpError::InvalidPath(request.arg1.clone()))
        }
    }
}

/// Serves a direct client data connection.
fn serve_client(
    stream: &mut TcpStream,
    addr: SocketAddr,
    backend: &StorageBackend,
    shutdown: &Arc<AtomicBool>,
) -> Result<(), NetError> {
    loop {
        let request = match read_message_with_shutdown(stream, shutdown) {
            Ok(Message::Request(request)) => request,
            Ok(other) => {
                warn!(
                    "event=storage_data_unexpected_frame peer={addr} frame={}",
                    message_name(&other)
                );
                Message::Ack(AckResponse::failure(ErrorCode::InvalidInput)).write_to(stream)?;
                continue;
            }
            Err(err) if is_disconnect(&err) || is_shutdown(&err) => return Ok(()),
            Err(err) => return Err(err),
        };
        match classify(request.request_type) {
            RequestClass::NonPrivileged(kind) => {
                serve_data_op(stream, backend, &request, kind, shutdown)?
            }
            RequestClass::Privileged(_) => {
                // Mutations must come through the naming server.
                Message::Ack(AckResponse::failure(ErrorCode::InvalidInput)).write_to(stream)?;
            }
        }
    }
}

fn serve_data_op(
    stream: &mut TcpStream,
    backend: &StorageBackend,
    request: &ClientRequest,
    kind: DataKind,
    shutdown: &Arc<AtomicBool>,
) -> Result<(), NetError> {
    match kind {
        DataKind::ReadFile => {
            let mut file = match backend.open_for_read(&request.arg1) {
                Ok(file) => file,
                Err(err) => return reply_op_error(stream, &request.arg1, err),
            };
            Message::Ack(AckResponse::success()).write_to(stream)?;
            let mut buffer = vec![0u8; MAX_CHUNK_LEN];
            loop {
                let read = file.read(&mut buffer).map_err(NetError::Io)?;
                let is_last = read == 0;
                Message::FileChunk {
                    bytes: buffer[..read].to_vec(),
                    is_last,
                }
                .write_to(stream)?;
                if is_last {
                    break;
                }
            }
        }
        DataKind::WriteFile => {
            let mut file = match backend.open_for_write(&request.arg1) {
                Ok(file) => file,
                Err(err) => return reply_op_error(stream, &request.arg1, err),
            };
            Message::Ack(AckResponse::success()).write_to(stream)?;
            loop {
                match read_message_with_shutdown(stream, shutdown)? {
                    Message::FileChunk { bytes, is_last } => {
                        file.write_all(&bytes).map_err(NetError::Io)?;
                        if is_last {
                            break;
                        }
                    }
                    other => {
                        warn!(
                            "event=storage_write_bad_frame path={} frame={}",
                            request.arg1,
                            message_name(&other)
                        );
                        Message::Ack(AckResponse::failure(ErrorCode::InvalidInput))
                            .write_to(stream)?;
                        return Ok(());
                    }
                }
            }
            file.flush().map_err(NetError::Io)?;
            Message::Ack(AckResponse::success()).write_to(stream)?;
        }
        DataKind::FileInfo => match backend.file_info(&request.arg1) {
            Ok(text) => {
                Message::Ack(AckResponse::success()).write_to(stream)?;
                Message::InfoText { text }.write_to(stream)?;
            }
            Err(err) => return reply_op_error(stream, &request.arg1, err),
        },
        DataKind::ListAll => match backend.list_all(&request.arg1) {
            Ok(text) => {
                Message::Ack(AckResponse::success()).write_to(stream)?;
                Message::InfoText { text }.write_to(stream)?;
            }
            Err(err) => return reply_op_error(stream, &request.arg1, err),
        },
    }
    Ok(())
}

fn reply_op_error(
    stream: &mut TcpStream,
    path: &str,
    err: StorageOpError,
) -> Result<(), NetError> {
    warn!("event=storage_data_op_failed path={path} error={err}");
    Message::Ack(AckResponse::failure(op_error_code(&err))).write_to(stream)?;
    Ok(())
}

fn op_error_code(err: &StorageOpError) -> ErrorCode {
    match err {
        StorageOpError::Io(_) => ErrorCode::RuntimeError,
        StorageOpError::InvalidPath(_) => ErrorCode::InvalidInput,
    }
}

#[derive(Debug, Error)]
pub enum StorageNodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] crate::wire::WireError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageOpError),
    #[error("naming server rejected registration: {0:?}")]
    Rejected(ErrorCode),
    #[error("unexpected {0} frame during registration")]
    UnexpectedFrame(&'static str),
}
