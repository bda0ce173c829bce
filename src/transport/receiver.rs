//! Collector-side datagram socket.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::observability::metrics;
use crate::transport::TransportError;

/// Receives raw datagrams into a reusable buffer.
///
/// The buffer holds one byte more than the configured limit, so a datagram
/// the OS had to cut is told apart from one that fits exactly.
pub struct DatagramReceiver {
    socket: UdpSocket,
    buffer: Vec<u8>,
    limit: usize,
    truncated: u64,
}

impl DatagramReceiver {
    /// Bind the listener. Failure here is fatal for the collector.
    pub async fn bind(address: &str, buffer_bytes: usize) -> Result<Self, TransportError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|_| TransportError::Address(address.to_string()))?;
        let socket = UdpSocket::bind(addr).await.map_err(TransportError::Bind)?;

        let limit = buffer_bytes.max(1);
        Ok(Self {
            socket,
            buffer: vec![0u8; limit + 1],
            limit,
            truncated: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Bind)
    }

    /// Datagrams cut to the buffer size so far.
    pub fn truncated(&self) -> u64 {
        self.truncated
    }

    /// Wait for the next datagram. A payload longer than the buffer is
    /// delivered cut to the buffer size, logged and counted.
    pub async fn recv(&mut self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let (len, peer) = self
            .socket
            .recv_from(&mut self.buffer)
            .await
            .map_err(TransportError::Receive)?;

        if len > self.limit {
            self.truncated += 1;
            metrics::record_truncated_datagram();
            tracing::warn!(
                peer = %peer,
                limit = self.limit,
                "Datagram exceeds the receive buffer and was truncated"
            );
        }
        Ok((self.buffer[..len.min(self.limit)].to_vec(), peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receives_raw_bytes() {
        let mut receiver = DatagramReceiver::bind("127.0.0.1:0", 1024).await.unwrap();
        let addr = receiver.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"hello", addr).await.unwrap();

        let (bytes, peer) = receiver.recv().await.unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(peer, sender.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_counted() {
        let mut receiver = DatagramReceiver::bind("127.0.0.1:0", 512).await.unwrap();
        let addr = receiver.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let event = format!(r#"{{"collection":"c","pad":"{}"}}"#, "x".repeat(1000));
        sender.send_to(event.as_bytes(), addr).await.unwrap();
        let (bytes, _) = receiver.recv().await.unwrap();
        assert_eq!(bytes.len(), 512);
        assert_eq!(receiver.truncated(), 1);

        let exact = vec![b'y'; 512];
        sender.send_to(&exact, addr).await.unwrap();
        let (bytes, _) = receiver.recv().await.unwrap();
        assert_eq!(bytes, exact);
        assert_eq!(receiver.truncated(), 1);
    }

    #[tokio::test]
    async fn test_bad_address() {
        let err = DatagramReceiver::bind("not-an-addr", 1024).await.err().unwrap();
        assert!(matches!(err, TransportError::Address(_)));
    }
}
