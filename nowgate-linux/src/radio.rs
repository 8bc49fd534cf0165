//! Radio adapter link: UDP datagrams to and from the radio co-processor.
//! Datagram = 6-byte peer address + frame bytes. Peer `ff:ff:ff:ff:ff:ff` on send means broadcast.

use std::io;
use std::net::SocketAddr;

use nowgate_core::address::ADDR_LEN;
use nowgate_core::{NodeAddr, FRAME_SIZE};
use tokio::net::UdpSocket;
use tracing::debug;

/// Prefix a frame with the peer address.
pub fn datagram(peer: NodeAddr, frame: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ADDR_LEN + frame.len());
    out.extend_from_slice(peer.as_bytes());
    out.extend_from_slice(frame);
    out
}

/// Split a datagram into peer address and frame bytes.
pub fn parse_datagram(bytes: &[u8]) -> Option<(NodeAddr, &[u8])> {
    if bytes.len() < ADDR_LEN {
        return None;
    }
    let (addr, frame) = bytes.split_at(ADDR_LEN);
    Some((NodeAddr::from_slice(addr)?, frame))
}

pub struct Radio {
    socket: UdpSocket,
    adapter: SocketAddr,
    buf: Vec<u8>,
}

impl Radio {
    pub async fn bind(bind: SocketAddr, adapter: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind).await?;
        Ok(Self {
            socket,
            adapter,
            // Room for oversized datagrams so they are seen whole and then decoded or dropped.
            buf: vec![0u8; 2 * (ADDR_LEN + FRAME_SIZE)],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Next frame from the adapter. Datagrams from other sources are ignored.
    pub async fn recv(&mut self) -> io::Result<(NodeAddr, Vec<u8>)> {
        loop {
            let (n, from) = self.socket.recv_from(&mut self.buf).await?;
            if from != self.adapter {
                debug!(%from, "datagram from unknown source ignored");
                continue;
            }
            match parse_datagram(&self.buf[..n]) {
                Some((peer, frame)) => return Ok((peer, frame.to_vec())),
                None => debug!(len = n, "short datagram ignored"),
            }
        }
    }

    pub async fn unicast(&self, to: NodeAddr, frame: &[u8]) -> io::Result<()> {
        self.socket.send_to(&datagram(to, frame), self.adapter).await?;
        Ok(())
    }

    pub async fn broadcast(&self, frame: &[u8]) -> io::Result<()> {
        self.unicast(NodeAddr::BROADCAST, frame).await
    }
}
