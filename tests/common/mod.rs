#![cfg(feature = "net")]
#![allow(dead_code)]

use nameplane::net::{
    ClientService, ClientServiceConfig, ClientServiceHandle, HeartbeatService,
    HeartbeatServiceConfig, HeartbeatServiceHandle, RegistrationService,
    RegistrationServiceConfig, RegistrationServiceHandle,
};
use nameplane::wire::{AckKind, AckResponse, Message, ServerDetails};
use nameplane::{NamingCore, ServerId};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct NamingFixture {
    pub core: Arc<NamingCore>,
    pub clients: ClientServiceHandle,
    pub registration: RegistrationServiceHandle,
    pub heartbeat: HeartbeatServiceHandle,
}

impl NamingFixture {
    /// Full naming-server stack on ephemeral loopback ports.
    pub fn spawn(init_servers: usize, replica_quota: usize) -> Self {
        let core = Arc::new(NamingCore::new(init_servers, replica_quota, 5));
        let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let registration = RegistrationService::spawn(
            RegistrationServiceConfig { bind },
            core.clone(),
        )
        .unwrap();
        let heartbeat =
            HeartbeatService::spawn(HeartbeatServiceConfig { bind }, core.clone()).unwrap();
        let clients = ClientService::spawn(
            ClientServiceConfig {
                bind,
                max_clients: 16,
            },
            core.clone(),
        )
        .unwrap();
        Self {
            core,
            clients,
            registration,
            heartbeat,
        }
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.clients.local_addr()
    }

    pub fn registration_addr(&self) -> SocketAddr {
        self.registration.local_addr()
    }

    pub fn heartbeat_addr(&self) -> SocketAddr {
        self.heartbeat.local_addr()
    }

    /// Registers a bare (fake) storage server and returns its liveness
    /// link; dropping the stream simulates the server dying. Blocks until
    /// the naming server has the link fully established, so a later drop
    /// is guaranteed to register as heartbeat loss.
    pub fn register_fake_server(&self, details: &ServerDetails) -> TcpStream {
        let mut stream = TcpStream::connect(self.registration_addr()).unwrap();
        Message::ServerDetails(details.clone())
            .write_to(&mut stream)
            .unwrap();
        let ack = read_ack(&mut stream);
        assert_eq!(ack.ack, AckKind::Success, "registration failed: {ack:?}");
        let links_before = self.link_up_count();
        let mut link = TcpStream::connect(self.heartbeat_addr()).unwrap();
        Message::HeartbeatHello {
            server_id: details.server_id,
        }
        .write_to(&mut link)
        .unwrap();
        wait_until(Duration::from_secs(5), || {
            self.core.is_online(details.server_id) && self.link_up_count() > links_before
        });
        link
    }

    fn link_up_count(&self) -> u64 {
        self.core
            .metrics_snapshot()
            .counters
            .get("nameplane.heartbeat.link_up")
            .copied()
            .unwrap_or(0)
    }
}

pub fn fake_details(raw: u16, proxy_port: u16, data_port: u16, paths: &[&str]) -> ServerDetails {
    ServerDetails {
        server_id: ServerId::new(raw),
        host: "127.0.0.1".into(),
        proxy_port,
        data_port,
        online: false,
        paths: paths.iter().map(|path| path.to_string()).collect(),
    }
}

pub fn read_ack(stream: &mut TcpStream) -> AckResponse {
    match Message::read_from(stream).unwrap() {
        Message::Ack(ack) => ack,
        other => panic!("expected ack, got {other:?}"),
    }
}

/// Polls `predicate` until it holds or the deadline passes.
pub fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("condition not reached within {timeout:?}");
}
