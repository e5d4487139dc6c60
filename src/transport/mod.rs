//! UDP-multicast transport.
//!
//! Builds each socket with `socket2` so it can set
//! `SO_REUSEADDR`/`SO_REUSEPORT` before binding, then converts it into a
//! `tokio::net::UdpSocket`. Two endpoints per peer: the shared multicast
//! socket (group traffic) and a per-peer unicast socket bound once the
//! peer is assigned a process id.

use crate::core::error::{CoreError, Result};
use crate::core::packet::{RawPacket, MAX_PACKET_BYTES};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// A datagram queued for transmission: the destination port (the group
/// port for a broadcast, or a specific peer's unicast port) and the
/// already-encoded bytes.
#[derive(Debug, Clone)]
pub struct OutgoingDatagram {
    pub target_port: u16,
    pub bytes: Vec<u8>,
}

fn bind_reusable(bind_addr: SocketAddr) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| CoreError::BindError { address: bind_addr.to_string(), source: e })?;

    socket
        .set_reuse_address(true)
        .map_err(|e| CoreError::BindError { address: bind_addr.to_string(), source: e })?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    {
        use std::os::unix::io::AsRawFd;
        let fd = socket.as_raw_fd();
        unsafe {
            let optval: libc::c_int = 1;
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEPORT,
                &optval as *const _ as *const libc::c_void,
                std::mem::size_of_val(&optval) as libc::socklen_t,
            );
        }
    }

    socket
        .bind(&bind_addr.into())
        .map_err(|e| CoreError::BindError { address: bind_addr.to_string(), source: e })?;
    socket
        .set_nonblocking(true)
        .map_err(|e| CoreError::BindError { address: bind_addr.to_string(), source: e })?;

    Ok(socket.into())
}

/// Owns the two datagram endpoints a peer has: the multicast socket
/// (always bound) and the unicast socket (bound once a process id is
/// assigned).
pub struct Transport {
    multicast_socket: Arc<UdpSocket>,
    unicast_socket: RwLock<Option<Arc<UdpSocket>>>,
    multicast_ip: Ipv4Addr,
    group_port: u16,
}

impl Transport {
    /// Join the shared multicast group used for group traffic.
    pub async fn bind_multicast(group: Ipv4Addr, port: u16) -> Result<Self> {
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let std_socket = bind_reusable(bind_addr)?;
        let socket = UdpSocket::from_std(std_socket)?;

        socket
            .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
            .map_err(|e| CoreError::MulticastJoinError { group: group.to_string(), source: e })?;

        tracing::info!(%group, port, "joined multicast group");

        Ok(Self {
            multicast_socket: Arc::new(socket),
            unicast_socket: RwLock::new(None),
            multicast_ip: group,
            group_port: port,
        })
    }

    /// Bind the per-peer unicast socket once discovery assigns a port.
    pub async fn bind_unicast(&self, port: u16) -> Result<()> {
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let std_socket = bind_reusable(bind_addr)?;
        let socket = UdpSocket::from_std(std_socket)?;

        tracing::info!(port, "unicast socket bound");
        *self.unicast_socket.write().await = Some(Arc::new(socket));
        Ok(())
    }

    /// Send to the multicast address if `target_port` is the group port,
    /// otherwise unicast to that peer's port on the same multicast
    /// address — every peer's unicast socket shares the group's address,
    /// so a directed send is simply a unicast datagram to that port.
    pub async fn send(&self, target_port: u16, bytes: &[u8]) -> Result<()> {
        if bytes.len() > MAX_PACKET_BYTES {
            return Err(CoreError::PacketTooLarge(bytes.len()));
        }

        let dest = SocketAddr::new(IpAddr::V4(self.multicast_ip), target_port);

        let sender = self.unicast_socket.read().await.clone();
        if let Some(sock) = sender {
            sock.send_to(bytes, dest).await?;
        } else {
            self.multicast_socket.send_to(bytes, dest).await?;
        }
        Ok(())
    }

    /// Spawn reader tasks for every currently-bound socket, each feeding
    /// `tx` with the raw bytes and sender address. Packets over the
    /// 1024-byte wire cap are a protocol error: logged and dropped.
    pub fn spawn_readers(self: &Arc<Self>, tx: mpsc::UnboundedSender<RawPacket>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let multicast = self.multicast_socket.clone();
        let multicast_tx = tx.clone();
        handles.push(tokio::spawn(async move {
            read_loop(multicast, multicast_tx).await;
        }));

        handles
    }

    /// Start a reader for the unicast socket once it has been bound. The
    /// caller is expected to call this right after `bind_unicast`.
    pub async fn spawn_unicast_reader(&self, tx: mpsc::UnboundedSender<RawPacket>) -> Option<JoinHandle<()>> {
        let sock = self.unicast_socket.read().await.clone()?;
        Some(tokio::spawn(async move {
            read_loop(sock, tx).await;
        }))
    }

    pub fn group_port(&self) -> u16 {
        self.group_port
    }
}

async fn read_loop(socket: Arc<UdpSocket>, tx: mpsc::UnboundedSender<RawPacket>) {
    let mut buf = vec![0u8; MAX_PACKET_BYTES + 1];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, sender)) => {
                if len > MAX_PACKET_BYTES {
                    tracing::warn!(len, "dropped oversized datagram (truncation)");
                    continue;
                }
                let bytes = buf[..len].to_vec();
                if tx.send(RawPacket { bytes, sender }).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = ?e, "transport read failed");
            }
        }
    }
}
