//! Syslog over a TCP stream, optionally wrapped in TLS
//!
//! After a failure the connection is dropped and no new connection is tried
//! until `reconnect_timeout` has passed since the failure (or the last failed
//! attempt). Writes inside that window fail fast with
//! [`TransportError::ReconnectPending`]. There is no background reconnect;
//! the next write after the window makes exactly one attempt.
//!
//! Every write is bounded by `write_timeout`. A collector that accepts the
//! connection but stops reading fills the send buffer; the write then times
//! out and counts as a failure like any other.
//!
//! A peer that has gone away is not always noticed on the first write after
//! it left: the kernel accepts data into the send buffer until the reset
//! arrives, so a few writes may succeed locally before the failure surfaces.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::framing::MessageTransfer;
use super::{Transport, WriteOutcome};
use crate::audit::config::StreamOptions;
use crate::error::TransportError;

/// Turns a connected TCP stream into the stream messages are written to
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stream type produced by this connector
    type Stream: AsyncWrite + Unpin + Send + Sync;

    /// Upgrade a freshly connected TCP stream
    async fn upgrade(&self, tcp: TcpStream) -> Result<Self::Stream, TransportError>;

    /// Protocol label for diagnostics
    fn protocol(&self) -> &'static str;
}

/// Plain TCP
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainConnector;

#[async_trait]
impl Connector for PlainConnector {
    type Stream = TcpStream;

    async fn upgrade(&self, tcp: TcpStream) -> Result<TcpStream, TransportError> {
        Ok(tcp)
    }

    fn protocol(&self) -> &'static str {
        "tcp"
    }
}

/// Framed stream transport with a reconnect gate
pub struct StreamTransport<C: Connector> {
    host: String,
    port: u16,
    framing: MessageTransfer,
    connect_timeout: Duration,
    write_timeout: Duration,
    reconnect_timeout: Duration,
    connector: C,
    stream: Option<C::Stream>,
    /// Set on any failure; cleared by a write over a new connection
    last_failure: Option<Instant>,
}

impl<C: Connector> std::fmt::Debug for StreamTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("protocol", &self.connector.protocol())
            .field("address", &self.address())
            .field("framing", &self.framing)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl<C: Connector> StreamTransport<C> {
    /// Create a transport; the connection is made on the first write
    pub fn new(host: &str, port: u16, options: StreamOptions, connector: C) -> Self {
        Self {
            host: host.to_string(),
            port,
            framing: options.message_transfer,
            connect_timeout: options.connect_timeout(),
            write_timeout: options.write_timeout(),
            reconnect_timeout: options.reconnect_timeout(),
            connector,
            stream: None,
            last_failure: None,
        }
    }

    /// Override the reconnect gate
    pub fn with_reconnect_timeout(mut self, reconnect_timeout: Duration) -> Self {
        self.reconnect_timeout = reconnect_timeout;
        self
    }

    /// Override the per-message write limit
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self) -> Result<C::Stream, TransportError> {
        let attempt = async {
            let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
            tcp.set_nodelay(true)?;
            self.connector.upgrade(tcp).await
        };

        match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectTimeout {
                address: self.address(),
                timeout: self.connect_timeout,
            }),
        }
    }

    /// Connect unless the reconnect gate is still closed
    ///
    /// Returns whether the new connection follows a failure.
    async fn ensure_connected(&mut self) -> Result<bool, TransportError> {
        if self.stream.is_some() {
            return Ok(false);
        }

        if let Some(failed_at) = self.last_failure {
            let elapsed = failed_at.elapsed();
            if elapsed < self.reconnect_timeout {
                let remaining = self.reconnect_timeout - elapsed;
                tracing::debug!(
                    address = %self.address(),
                    remaining_ms = remaining.as_millis() as u64,
                    "Reconnect suppressed"
                );
                return Err(TransportError::ReconnectPending {
                    address: self.address(),
                    remaining,
                });
            }
        }

        match self.connect().await {
            Ok(stream) => {
                tracing::debug!(address = %self.address(), "Connected to syslog collector");
                self.stream = Some(stream);
                Ok(self.last_failure.is_some())
            }
            Err(e) => {
                self.last_failure = Some(Instant::now());
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<C: Connector> Transport for StreamTransport<C> {
    async fn write(&mut self, message: &[u8]) -> Result<WriteOutcome, TransportError> {
        let reconnected = self.ensure_connected().await?;
        let frame = self.framing.frame(message);

        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::Io(std::io::ErrorKind::NotConnected.into()));
        };

        let written = tokio::time::timeout(self.write_timeout, async {
            stream.write_all(&frame).await?;
            stream.flush().await
        })
        .await;

        let error = match written {
            Ok(Ok(())) if reconnected => {
                self.last_failure = None;
                return Ok(WriteOutcome::Reconnected);
            }
            Ok(Ok(())) => return Ok(WriteOutcome::Written),
            Ok(Err(e)) => TransportError::Io(e),
            Err(_) => TransportError::WriteTimeout {
                address: self.address(),
                timeout: self.write_timeout,
            },
        };
        // A partial frame may have been sent; the connection is unusable
        self.stream = None;
        self.last_failure = Some(Instant::now());
        Err(error)
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            match tokio::time::timeout(self.write_timeout, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(address = %self.address(), "Shutdown on close failed: {}", e);
                }
                Err(_) => {
                    tracing::debug!(address = %self.address(), "Shutdown on close timed out");
                }
            }
        }
    }

    async fn recycle(&mut self) -> Result<(), TransportError> {
        self.close().await;
        self.last_failure = None;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} {}", self.connector.protocol(), self.address())
    }
}
