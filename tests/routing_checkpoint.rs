#![cfg(feature = "net")]

//! End-to-end routing classification over real loopback sockets, with a
//! scripted storage server standing in on the proxy side.

mod common;

use common::{fake_details, read_ack, wait_until, NamingFixture};
use nameplane::wire::{
    AckKind, AckResponse, ClientRequest, ErrorCode, Message, RequestType, ServerDetails,
};
use nameplane::ServerId;
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

fn request(request_type: RequestType, arg1: &str, arg2: &str) -> ClientRequest {
    ClientRequest {
        request_type,
        arg1: arg1.into(),
        arg2: arg2.into(),
    }
}

#[test]
fn read_request_redirects_to_owner() {
    let fixture = NamingFixture::spawn(1, 1);
    let details = fake_details(0, 6060, 7070, &["/docs/a.txt"]);
    let _link = fixture.register_fake_server(&details);

    let mut client = TcpStream::connect(fixture.client_addr()).unwrap();
    Message::Request(request(RequestType::ReadFile, "/docs/a.txt", ""))
        .write_to(&mut client)
        .unwrap();
    let ack = read_ack(&mut client);
    assert_eq!(ack.ack, AckKind::ConnectToServer);
    assert_eq!(ack.error, ErrorCode::Success);
    match Message::read_from(&mut client).unwrap() {
        Message::RedirectTarget { host, data_port } => {
            assert_eq!(host, "127.0.0.1");
            assert_eq!(data_port, 7070);
        }
        other => panic!("expected redirect target, got {other:?}"),
    }
}

#[test]
fn unknown_path_rejected_but_connection_survives() {
    let fixture = NamingFixture::spawn(1, 1);
    let _link = fixture.register_fake_server(&fake_details(0, 6060, 7070, &["/docs/a.txt"]));

    let mut client = TcpStream::connect(fixture.client_addr()).unwrap();
    Message::Request(request(RequestType::ReadFile, "/missing", ""))
        .write_to(&mut client)
        .unwrap();
    let ack = read_ack(&mut client);
    assert_eq!(ack.ack, AckKind::Failure);
    assert_eq!(ack.error, ErrorCode::WrongPath);

    // Rejection is per-request: the same connection keeps working.
    Message::Request(request(RequestType::ReadFile, "/docs/a.txt", ""))
        .write_to(&mut client)
        .unwrap();
    assert_eq!(read_ack(&mut client).ack, AckKind::ConnectToServer);
    let _ = Message::read_from(&mut client).unwrap();
}

#[test]
fn offline_owner_rejected_after_heartbeat_loss() {
    let fixture = NamingFixture::spawn(1, 1);
    let link = fixture.register_fake_server(&fake_details(0, 6060, 7070, &["/docs/a.txt"]));
    drop(link);
    wait_until(Duration::from_secs(5), || {
        !fixture.core.is_online(ServerId::new(0))
    });

    let mut client = TcpStream::connect(fixture.client_addr()).unwrap();
    Message::Request(request(RequestType::ReadFile, "/docs/a.txt", ""))
        .write_to(&mut client)
        .unwrap();
    let ack = read_ack(&mut client);
    assert_eq!(ack.ack, AckKind::Failure);
    assert_eq!(ack.error, ErrorCode::ServerOffline);
}

#[test]
fn create_request_proxies_and_relays_final_ack() {
    let fixture = NamingFixture::spawn(1, 1);

    // Scripted storage server: one proxied exchange, then done.
    let proxy_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let proxy_port = proxy_listener.local_addr().unwrap().port();
    let server_id = ServerId::new(0);
    let storage = std::thread::spawn(move || {
        let (mut stream, _) = proxy_listener.accept().unwrap();
        let forwarded = match Message::read_from(&mut stream).unwrap() {
            Message::Request(request) => request,
            other => panic!("expected forwarded request, got {other:?}"),
        };
        assert_eq!(forwarded.request_type, RequestType::CreateFile);
        assert_eq!(forwarded.arg1, "/docs/");
        assert_eq!(forwarded.arg2, "new.txt");
        Message::Ack(AckResponse::success())
            .write_to(&mut stream)
            .unwrap();
        Message::PathReport {
            server_id,
            paths: vec!["/docs/".into(), "/docs/new.txt".into()],
        }
        .write_to(&mut stream)
        .unwrap();
    });

    let _link = fixture.register_fake_server(&fake_details(0, proxy_port, 7070, &["/docs/"]));

    let mut client = TcpStream::connect(fixture.client_addr()).unwrap();
    Message::Request(request(RequestType::CreateFile, "/docs/", "new.txt"))
        .write_to(&mut client)
        .unwrap();
    let init = read_ack(&mut client);
    assert_eq!(init.ack, AckKind::Init);
    let relayed = read_ack(&mut client);
    assert_eq!(relayed.ack, AckKind::Success);
    storage.join().unwrap();

    // The refreshed path report landed in the index.
    Message::Request(request(RequestType::ReadFile, "/docs/new.txt", ""))
        .write_to(&mut client)
        .unwrap();
    assert_eq!(read_ack(&mut client).ack, AckKind::ConnectToServer);
    let _ = Message::read_from(&mut client).unwrap();
}

#[test]
fn proxy_failure_absorbed_as_other() {
    let fixture = NamingFixture::spawn(1, 1);
    // Proxy port that refuses the exchange: accept and immediately close.
    let proxy_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let proxy_port = proxy_listener.local_addr().unwrap().port();
    let storage = std::thread::spawn(move || {
        let (stream, _) = proxy_listener.accept().unwrap();
        drop(stream);
    });

    let _link = fixture.register_fake_server(&fake_details(0, proxy_port, 7070, &["/docs/"]));

    let mut client = TcpStream::connect(fixture.client_addr()).unwrap();
    Message::Request(request(RequestType::DeleteDir, "/docs/", ""))
        .write_to(&mut client)
        .unwrap();
    assert_eq!(read_ack(&mut client).ack, AckKind::Init);
    let relayed = read_ack(&mut client);
    assert_eq!(relayed.ack, AckKind::Failure);
    assert_eq!(relayed.error, ErrorCode::Other);
    storage.join().unwrap();

    // The storage server stays online: only heartbeat loss flips it.
    assert!(fixture.core.is_online(ServerId::new(0)));
}

#[test]
fn duplicate_registration_rejected_while_first_online() {
    let fixture = NamingFixture::spawn(1, 1);
    let details = fake_details(3, 6060, 7070, &["/x"]);
    let _link = fixture.register_fake_server(&details);

    let mut second = TcpStream::connect(fixture.registration_addr()).unwrap();
    let mut hijack: ServerDetails = details.clone();
    hijack.host = "10.0.0.99".into();
    Message::ServerDetails(hijack).write_to(&mut second).unwrap();
    let ack = read_ack(&mut second);
    assert_eq!(ack.ack, AckKind::Failure);
    assert_eq!(ack.error, ErrorCode::ServerAlreadyRegistered);

    // First registration untouched.
    let address = fixture.core.server_address(ServerId::new(3)).unwrap();
    assert_eq!(address.host, "127.0.0.1");
    assert!(fixture.core.is_online(ServerId::new(3)));
}

#[test]
fn quorum_gate_opens_at_threshold() {
    let fixture = NamingFixture::spawn(2, 1);
    assert!(!fixture.core.gate().is_open());
    let _link0 = fixture.register_fake_server(&fake_details(0, 6060, 7070, &["/a"]));
    assert!(!fixture.core.gate().wait_timeout(Duration::from_millis(50)));
    let _link1 = fixture.register_fake_server(&fake_details(1, 6061, 7071, &["/b"]));
    assert!(fixture.core.gate().wait_timeout(Duration::from_secs(1)));
}

#[test]
fn offline_cascade_repairs_replicas() {
    let fixture = NamingFixture::spawn(3, 1);
    let _link0 = fixture.register_fake_server(&fake_details(0, 6060, 7070, &["/a"]));
    let _link1 = fixture.register_fake_server(&fake_details(1, 6061, 7071, &["/b"]));
    let link2 = fixture.register_fake_server(&fake_details(2, 6062, 7072, &["/c"]));

    // Quorum assignment gave everyone exactly one active replica.
    for raw in 0..3u16 {
        let record = fixture.core.replica_record(ServerId::new(raw)).unwrap();
        assert_eq!(record.active.len(), 1);
    }

    drop(link2);
    let lost = ServerId::new(2);
    wait_until(Duration::from_secs(5), || !fixture.core.is_online(lost));
    wait_until(Duration::from_secs(5), || {
        (0..2u16).all(|raw| {
            let record = fixture.core.replica_record(ServerId::new(raw)).unwrap();
            !record.active.contains(&lost) && record.active.len() == 1
        })
    });
    for raw in 0..2u16 {
        let record = fixture.core.replica_record(ServerId::new(raw)).unwrap();
        assert!(record.active.is_disjoint(&record.inactive));
    }
}
