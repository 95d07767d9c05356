//! Syslog over UDP
//!
//! A send accepted by the local socket counts as delivered. Datagrams lost
//! on the way are invisible to the handler.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::{Transport, WriteOutcome};
use crate::error::TransportError;

/// One datagram per record to a syslog collector
#[derive(Debug)]
pub struct UdpTransport {
    host: String,
    port: u16,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    /// Create a transport for `host:port`; nothing is resolved yet
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            socket: None,
        }
    }

    async fn connect(&self) -> Result<UdpSocket, TransportError> {
        let peer = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| TransportError::Resolve(format!("{}:{}", self.host, self.port)))?;

        let local: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        Ok(socket)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn write(&mut self, message: &[u8]) -> Result<WriteOutcome, TransportError> {
        if self.socket.is_none() {
            self.socket = Some(self.connect().await?);
        }
        let Some(socket) = self.socket.as_ref() else {
            return Err(TransportError::Io(std::io::ErrorKind::NotConnected.into()));
        };

        if let Err(e) = socket.send(message).await {
            self.socket = None;
            return Err(e.into());
        }
        Ok(WriteOutcome::Written)
    }

    async fn close(&mut self) {
        self.socket = None;
    }

    async fn recycle(&mut self) -> Result<(), TransportError> {
        self.close().await;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("udp {}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_datagram_per_message() {
        let collector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = collector.local_addr().unwrap().port();

        let mut transport = UdpTransport::new("127.0.0.1", port);
        transport.write(b"<13>1 first").await.unwrap();
        transport.write(b"<13>1 second").await.unwrap();

        let mut buf = [0u8; 1024];
        let n = collector.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"<13>1 first");
        let n = collector.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"<13>1 second");
    }

    #[tokio::test]
    async fn test_unresolvable_host_fails() {
        let mut transport = UdpTransport::new("host.invalid", 514);
        assert!(transport.write(b"x").await.is_err());
    }
}
