// NEP Gateway - DNS Tests
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Interception resolver over real UDP sockets on loopback.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use nepserver_gateway::{DnsConfig, DnsServer, INTERCEPT_TTL};
use tokio::net::UdpSocket;
use tokio::sync::watch;

const LAN_ADDR: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
const UPSTREAM_ANSWER: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

fn query(id: u16, name: &str, record_type: RecordType) -> Message {
    let mut msg = Message::new();
    msg.set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    msg.add_query(Query::query(Name::from_ascii(name).unwrap(), record_type));
    msg
}

/// Start a resolver on an ephemeral loopback port
async fn start(
    upstream: Option<SocketAddr>,
    upstream_timeout: Duration,
) -> (SocketAddr, watch::Sender<bool>) {
    let server = DnsServer::bind(DnsConfig {
        listen: SocketAddr::from(([127, 0, 0, 1], 0)),
        response_addr: LAN_ADDR,
        upstream,
        upstream_timeout,
        ..Default::default()
    })
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let (tx, rx) = watch::channel(false);
    tokio::spawn(server.run(rx));
    (addr, tx)
}

/// Upstream that answers every query with one A record
async fn fake_upstream() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let request = Message::from_vec(&buf[..len]).unwrap();
            let mut reply = Message::new();
            reply
                .set_id(request.id())
                .set_message_type(MessageType::Response)
                .set_response_code(ResponseCode::NoError);
            reply.add_queries(request.queries().iter().cloned());
            reply.add_answer(Record::from_rdata(
                request.queries()[0].name().clone(),
                300,
                RData::A(A::from(UPSTREAM_ANSWER)),
            ));
            socket.send_to(&reply.to_vec().unwrap(), peer).await.unwrap();
        }
    });
    addr
}

async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn recv(socket: &UdpSocket) -> Message {
    let mut buf = vec![0u8; 4096];
    let len = tokio::time::timeout(Duration::from_secs(5), socket.recv(&mut buf))
        .await
        .expect("no DNS reply")
        .unwrap();
    Message::from_vec(&buf[..len]).unwrap()
}

async fn ask(server: SocketAddr, request: &Message) -> Message {
    let socket = client().await;
    socket
        .send_to(&request.to_vec().unwrap(), server)
        .await
        .unwrap();
    recv(&socket).await
}

#[tokio::test]
async fn test_intercepted_name_answered_locally() {
    let (server, _shutdown) = start(None, Duration::from_secs(1)).await;

    let response = ask(server, &query(0x1234, "www.nepviewer.net.", RecordType::A)).await;

    assert_eq!(response.id(), 0x1234);
    assert_eq!(response.message_type(), MessageType::Response);
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert!(response.authoritative());
    assert_eq!(response.queries().len(), 1);
    assert_eq!(response.answers().len(), 1);
    assert_eq!(response.answers()[0].ttl(), INTERCEPT_TTL);
    assert_eq!(
        response.answers()[0].data(),
        Some(&RData::A(A::from(LAN_ADDR)))
    );
}

#[tokio::test]
async fn test_intercepted_name_any_case_and_type() {
    let (server, _shutdown) = start(None, Duration::from_secs(1)).await;

    let response = ask(server, &query(9, "WWW.NEPVIEWER.NET.", RecordType::AAAA)).await;

    assert_eq!(response.answers().len(), 1);
    assert_eq!(
        response.answers()[0].data(),
        Some(&RData::A(A::from(LAN_ADDR)))
    );
}

#[tokio::test]
async fn test_other_names_forwarded() {
    let upstream = fake_upstream().await;
    let (server, _shutdown) = start(Some(upstream), Duration::from_secs(1)).await;

    let response = ask(server, &query(0x4242, "example.com.", RecordType::A)).await;

    assert_eq!(response.id(), 0x4242);
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert_eq!(response.answers().len(), 1);
    assert_eq!(response.answers()[0].ttl(), 300);
    assert_eq!(
        response.answers()[0].data(),
        Some(&RData::A(A::from(UPSTREAM_ANSWER)))
    );
}

#[tokio::test]
async fn test_forwarding_disabled_answers_empty() {
    let (server, _shutdown) = start(None, Duration::from_secs(1)).await;

    let response = ask(server, &query(77, "example.com.", RecordType::A)).await;

    assert_eq!(response.id(), 77);
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert!(response.answers().is_empty());
}

#[tokio::test]
async fn test_silent_upstream_times_out_empty() {
    // Bound but never read, so queries go unanswered
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let upstream = silent.local_addr().unwrap();
    let (server, _shutdown) = start(Some(upstream), Duration::from_millis(200)).await;

    let started = Instant::now();
    let response = ask(server, &query(5, "example.com.", RecordType::A)).await;

    assert_eq!(response.id(), 5);
    assert!(response.answers().is_empty());
    assert!(started.elapsed() >= Duration::from_millis(200));

    // The resolver keeps serving afterwards
    let response = ask(server, &query(6, "www.nepviewer.net.", RecordType::A)).await;
    assert_eq!(response.answers().len(), 1);
}

#[tokio::test]
async fn test_slow_upstream_does_not_block_interception() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let upstream = silent.local_addr().unwrap();
    let (server, _shutdown) = start(Some(upstream), Duration::from_secs(2)).await;

    let socket = client().await;
    socket
        .send_to(&query(1, "example.com.", RecordType::A).to_vec().unwrap(), server)
        .await
        .unwrap();
    socket
        .send_to(
            &query(2, "www.nepviewer.net.", RecordType::A).to_vec().unwrap(),
            server,
        )
        .await
        .unwrap();

    let first = recv(&socket).await;
    assert_eq!(first.id(), 2);
    assert_eq!(first.answers().len(), 1);

    let second = recv(&socket).await;
    assert_eq!(second.id(), 1);
    assert!(second.answers().is_empty());
}

#[tokio::test]
async fn test_malformed_query_ignored() {
    let (server, _shutdown) = start(None, Duration::from_secs(1)).await;

    let socket = client().await;
    socket.send_to(&[0xde, 0xad], server).await.unwrap();

    // Still answers well-formed queries afterwards
    let response = ask(server, &query(3, "www.nepviewer.net.", RecordType::A)).await;
    assert_eq!(response.id(), 3);
}

#[tokio::test]
async fn test_shutdown_stops_server() {
    let server = DnsServer::bind(DnsConfig {
        listen: SocketAddr::from(([127, 0, 0, 1], 0)),
        upstream: None,
        ..Default::default()
    })
    .await
    .unwrap();
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(server.run(rx));

    tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
}
