//! Integration tests for the UDP-multicast transport: real sockets, real
//! datagrams, looped back over localhost.

use destinator::core::packet::{pack, MessageType};
use destinator::core::vector::Vector;
use destinator::transport::Transport;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

static NEXT_PORT: AtomicU16 = AtomicU16::new(40000);

fn next_port_pair() -> (u16, u16) {
    let base = NEXT_PORT.fetch_add(4, Ordering::Relaxed);
    (base, base + 1)
}

#[tokio::test]
async fn a_multicast_broadcast_reaches_every_joined_peer() {
    let (group_port, _) = next_port_pair();
    let group = Ipv4Addr::new(224, 1, 1, 1);

    let sender = Arc::new(Transport::bind_multicast(group, group_port).await.unwrap());
    let receiver = Arc::new(Transport::bind_multicast(group, group_port).await.unwrap());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handles = receiver.spawn_readers(tx);

    let vector = Vector::new(group.to_string());
    let bytes = pack(&vector, MessageType::Temperature, serde_json::json!(42)).unwrap();
    sender.send(group_port, &bytes).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for the broadcast")
        .expect("reader channel closed");

    assert_eq!(received.bytes, bytes);
}

#[tokio::test]
async fn a_directed_send_reaches_only_the_bound_unicast_socket() {
    let (group_port, unicast_port) = next_port_pair();
    let group = Ipv4Addr::new(224, 1, 1, 1);

    let sender = Arc::new(Transport::bind_multicast(group, group_port).await.unwrap());
    let receiver = Arc::new(Transport::bind_multicast(group, group_port + 1).await.unwrap());
    receiver.bind_unicast(unicast_port).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _unicast_reader = receiver.spawn_unicast_reader(tx).await;

    let vector = Vector::new(group.to_string());
    let bytes = pack(&vector, MessageType::Temperature, serde_json::json!(7)).unwrap();
    sender.send(unicast_port, &bytes).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for the unicast datagram")
        .expect("reader channel closed");

    assert_eq!(received.bytes, bytes);
}

#[tokio::test]
async fn group_port_reports_the_bound_multicast_port() {
    let (group_port, _) = next_port_pair();
    let group = Ipv4Addr::new(224, 1, 1, 1);

    let transport = Transport::bind_multicast(group, group_port).await.unwrap();
    assert_eq!(transport.group_port(), group_port);
}
