#![cfg(feature = "net")]

//! Shared accept-loop machinery for the naming server's three listeners.
//!
//! A listener runs nonblocking accepts on its own thread, hands every
//! connection to a handler thread, tracks the handler joins, and obeys a
//! shared shutdown flag. Blocking reads inside handlers use a short
//! socket timeout purely to poll that flag; semantically they still block
//! until data arrives or the peer disconnects.

use crate::net::NetError;
use crate::timeouts::{ACCEPT_BACKOFF, READ_POLL_INTERVAL, SERVER_SHUTDOWN_GRACE};
use crate::wire::{Message, WireError, MAX_FRAME_LEN};
use log::{error, info, warn};
use parking_lot::{Condvar, Mutex};
use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct AcceptLoopState {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl AcceptLoopState {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn mark_stopped(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.condvar.notify_all();
    }

    fn wait_for_stop(&self, timeout: Duration, name: &'static str) -> Result<(), NetError> {
        let mut done = self.done.lock();
        if *done {
            return Ok(());
        }
        self.condvar.wait_for(&mut done, timeout);
        if *done {
            Ok(())
        } else {
            Err(NetError::from(crate::net::ProtocolError::ShutdownTimeout {
                context: name,
            }))
        }
    }
}

#[derive(Default)]
struct ConnectionTracker {
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ConnectionTracker {
    fn track(&self, handle: thread::JoinHandle<()>) {
        self.handles.lock().push(handle);
    }

    fn join_all(&self) {
        let mut handles = self.handles.lock();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }
}

struct ConnectionLimiter {
    active: AtomicUsize,
    limit: usize,
}

impl ConnectionLimiter {
    fn new(limit: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            limit,
        }
    }

    fn try_acquire(&self) -> bool {
        loop {
            let value = self.active.load(Ordering::Relaxed);
            if value >= self.limit {
                return false;
            }
            if self
                .active
                .compare_exchange(value, value + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::Release);
    }
}

struct ConnectionPermit {
    limiter: Arc<ConnectionLimiter>,
}

impl ConnectionPermit {
    fn new(limiter: Arc<ConnectionLimiter>) -> Option<Self> {
        limiter.try_acquire().then(|| Self { limiter })
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

pub(crate) struct ServerHandle {
    name: &'static str,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
    connections: Arc<ConnectionTracker>,
    state: Arc<AcceptLoopState>,
}

impl ServerHandle {
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn try_shutdown(&mut self, timeout: Duration) -> Result<(), NetError> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join.take() {
            self.state.wait_for_stop(timeout, self.name)?;
            if handle.join().is_err() {
                warn!("event=accept_loop_panic name={}", self.name);
            }
        }
        self.connections.join_all();
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.try_shutdown(SERVER_SHUTDOWN_GRACE);
    }
}

pub(crate) fn spawn_listener<F>(
    name: &'static str,
    listener: TcpListener,
    max_connections: Option<usize>,
    handler: F,
) -> io::Result<ServerHandle>
where
    F: Fn(TcpStream, SocketAddr, Arc<AtomicBool>) -> Result<(), NetError> + Send + Sync + 'static,
{
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;
    info!("event={name}_listen addr={local_addr}");
    let shutdown = Arc::new(AtomicBool::new(false));
    let tracker = Arc::new(ConnectionTracker::default());
    let handler = Arc::new(handler);
    let limiter = max_connections.map(|limit| (limit, Arc::new(ConnectionLimiter::new(limit))));
    let shutdown_handle = shutdown.clone();
    let tracker_clone = tracker.clone();
    let state = Arc::new(AcceptLoopState::new());
    let accept_state = state.clone();
    let join = thread::spawn(move || {
        loop {
            if shutdown_handle.load(Ordering::Relaxed) {
                break;
            }
            match listener.accept() {
                Ok((stream, addr)) => {
                    let permit = if let Some((limit, limiter)) = limiter.as_ref() {
                        match ConnectionPermit::new(limiter.clone()) {
                            Some(permit) => Some(permit),
                            None => {
                                warn!(
                                    "event={name}_connection_rejected addr={addr} reason=too_many_connections limit={limit}"
                                );
                                continue;
                            }
                        }
                    } else {
                        None
                    };
                    if let Err(err) = configure_stream(&stream) {
                        warn!("event={name}_stream_config_error addr={addr} error={err}");
                        continue;
                    }
                    let handler = handler.clone();
                    let shutdown_token = shutdown_handle.clone();
                    let connection = thread::spawn(move || {
                        let _permit = permit;
                        if let Err(err) = handler(stream, addr, shutdown_token) {
                            warn!("event={name}_connection_error addr={addr} error={err}");
                        }
                    });
                    tracker_clone.track(connection);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_BACKOFF);
                }
                Err(err) => {
                    error!("event={name}_accept_error error={err}");
                    break;
                }
            }
        }
        accept_state.mark_stopped();
    });
    Ok(ServerHandle {
        name,
        local_addr,
        shutdown,
        join: Some(join),
        connections: tracker,
        state,
    })
}

fn configure_stream(stream: &TcpStream) -> io::Result<()> {
    // The read timeout is a shutdown poll, not a liveness deadline.
    stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;
    Ok(())
}

/// Reads exactly `buf` from the stream, treating timeout ticks as a cue
/// to re-check the shutdown flag. `UnexpectedEof` means the peer closed
/// cleanly before any byte; `Interrupted` means we are shutting down.
pub(crate) fn read_exact_with_shutdown(
    stream: &mut TcpStream,
    buf: &mut [u8],
    shutdown: &Arc<AtomicBool>,
) -> io::Result<()> {
    let mut read = 0;
    while read < buf.len() {
        if shutdown.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "server shutdown"));
        }
        match stream.read(&mut buf[read..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed connection",
                ))
            }
            Ok(n) => read += n,
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Shutdown-aware counterpart of [`Message::read_from`].
pub(crate) fn read_message_with_shutdown(
    stream: &mut TcpStream,
    shutdown: &Arc<AtomicBool>,
) -> Result<Message, NetError> {
    let mut header = [0u8; 5];
    read_exact_with_shutdown(stream, &mut header, shutdown)?;
    let wire_id = header[0];
    let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(NetError::Wire(WireError::FrameTooLarge(len)));
    }
    let mut payload = vec![0u8; len];
    read_exact_with_shutdown(stream, &mut payload, shutdown)?;
    Ok(Message::decode(wire_id, &payload)?)
}

/// Whether an error from the shutdown-aware readers means "peer went
/// away before the next frame" (a clean end of conversation).
pub(crate) fn is_disconnect(err: &NetError) -> bool {
    matches!(
        err,
        NetError::Io(io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof
    ) || matches!(
        err,
        NetError::Wire(WireError::Io(io_err)) if io_err.kind() == io::ErrorKind::UnexpectedEof
    )
}

/// Whether the error is the shutdown interrupt injected by the pollers.
pub(crate) fn is_shutdown(err: &NetError) -> bool {
    matches!(
        err,
        NetError::Io(io_err) if io_err.kind() == io::ErrorKind::Interrupted
    )
}
