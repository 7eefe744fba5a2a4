//! UDP transport for controller traffic.
//!
//! The controller loop talks to a [`DatagramSocket`] so tests can swap the
//! kernel socket for an in-memory pair.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// Largest datagram a controller sends
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// Datagram socket used by the controller loop
#[async_trait]
pub trait DatagramSocket: Send + Sync {
    /// Send one datagram
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize>;
    /// Receive one datagram into `buf`
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    /// Bound address
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl DatagramSocket for UdpSocket {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, payload, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Bind a UDP socket with broadcast enabled
pub async fn bind_udp(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(addr).await?;
    socket.set_broadcast(true)?;
    info!("Listening for controllers on {}", socket.local_addr()?);
    Ok(socket)
}

/// Bind, retrying every `delay` until the address becomes available
pub async fn bind_with_retry(addr: SocketAddr, delay: Duration) -> UdpSocket {
    loop {
        match bind_udp(addr).await {
            Ok(socket) => return socket,
            Err(e) => {
                warn!("Failed to bind {}: {}, retrying in {:?}", addr, e, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// One end of an in-memory datagram link
#[derive(Debug)]
pub struct MemorySocket {
    local: SocketAddr,
    peer_tx: mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>,
    rx: Mutex<mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>>,
}

impl MemorySocket {
    /// Two connected ends; whatever one sends the other receives
    pub fn pair(a: SocketAddr, b: SocketAddr) -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                local: a,
                peer_tx: b_tx,
                rx: Mutex::new(a_rx),
            },
            Self {
                local: b,
                peer_tx: a_tx,
                rx: Mutex::new(b_rx),
            },
        )
    }
}

#[async_trait]
impl DatagramSocket for MemorySocket {
    async fn send_to(&self, payload: &[u8], _target: SocketAddr) -> io::Result<usize> {
        self.peer_tx
            .send((self.local, payload.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer dropped"))?;
        Ok(payload.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (from, datagram) = self
            .rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "peer dropped"))?;
        // truncated like a short UDP read
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok((n, from))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_localhost_exchange() {
        let a = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b_addr = DatagramSocket::local_addr(&b).unwrap();

        DatagramSocket::send_to(&a, br#"{"t":"scan"}"#, b_addr)
            .await
            .unwrap();
        let mut buf = [0u8; 64];
        let (n, from) = DatagramSocket::recv_from(&b, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], br#"{"t":"scan"}"#);
        assert_eq!(from, DatagramSocket::local_addr(&a).unwrap());
    }

    #[tokio::test]
    async fn test_memory_pair_tags_sender() {
        let a_addr: SocketAddr = "10.0.0.1:7000".parse().unwrap();
        let b_addr: SocketAddr = "10.0.0.2:7000".parse().unwrap();
        let (a, b) = MemorySocket::pair(a_addr, b_addr);

        b.send_to(b"hello", a_addr).await.unwrap();
        let mut buf = [0u8; 3];
        let (n, from) = a.recv_from(&mut buf).await.unwrap();
        assert_eq!((n, from), (3, b_addr));
        assert_eq!(&buf, b"hel");

        drop(b);
        assert!(a.send_to(b"x", b_addr).await.is_err());
    }
}
