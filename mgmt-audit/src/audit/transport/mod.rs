//! Record transports
//!
//! A transport owns the destination resource (file handle or socket) and
//! writes already formatted messages to it. Transports report failures; the
//! owning [`AuditHandler`](super::AuditHandler) decides what they mean.
//!
//! # Available Transports
//!
//! - [`FileTransport`]: append-only local file, renamed aside on recycle
//! - [`UdpTransport`]: one best-effort datagram per record
//! - [`StreamTransport`]: TCP, optionally wrapped in TLS, with framing and a
//!   reconnect gate

use async_trait::async_trait;

use super::config::{Destination, SyslogProtocol};
use crate::error::{Result, TransportError};

pub mod file;
pub mod framing;
pub mod tcp;
pub mod tls;
pub mod udp;

pub use file::FileTransport;
pub use framing::MessageTransfer;
pub use tcp::{Connector, PlainConnector, StreamTransport};
pub use tls::{load_client_config, TlsConnector};
pub use udp::UdpTransport;

/// Result of a successful write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written over the existing resource
    Written,
    /// Written over a connection re-established after a failure
    Reconnected,
}

/// A destination for formatted audit messages
#[async_trait]
pub trait Transport: Send {
    /// Write one message, opening the underlying resource if needed
    async fn write(&mut self, message: &[u8]) -> std::result::Result<WriteOutcome, TransportError>;

    /// Release the underlying resource; the next write reopens it
    async fn close(&mut self);

    /// Close and force a fresh open on the next write
    ///
    /// File transports move a non-empty file aside first.
    async fn recycle(&mut self) -> std::result::Result<(), TransportError>;

    /// Human-readable destination, for diagnostics
    fn describe(&self) -> String;
}

/// Create the transport for a destination
///
/// Nothing is opened here; TLS material is loaded eagerly so that a bad
/// truststore is rejected when the handler is configured.
pub fn open(destination: &Destination) -> Result<Box<dyn Transport>> {
    match destination {
        Destination::File(file) => Ok(Box::new(FileTransport::new(file.resolved_path()))),
        Destination::Syslog(syslog) => match &syslog.protocol {
            SyslogProtocol::Udp => Ok(Box::new(UdpTransport::new(&syslog.host, syslog.port))),
            SyslogProtocol::Tcp(options) => Ok(Box::new(StreamTransport::new(
                &syslog.host,
                syslog.port,
                *options,
                PlainConnector,
            ))),
            SyslogProtocol::Tls(tls) => {
                let client_config = load_client_config(&tls.truststore, tls.client_cert.as_ref())?;
                let connector = TlsConnector::new(client_config, &syslog.host)?;
                Ok(Box::new(StreamTransport::new(
                    &syslog.host,
                    syslog.port,
                    tls.stream_options(),
                    connector,
                )))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::config::{FileDestination, SyslogDestination, TlsOptions};
    use crate::error::Error;

    #[test]
    fn test_open_describes_destination() {
        let file = open(&Destination::File(FileDestination {
            path: "audit.log".into(),
            relative_to: Some("/var/log".into()),
        }))
        .unwrap();
        assert_eq!(file.describe(), "file /var/log/audit.log");

        let udp = open(&Destination::Syslog(SyslogDestination::udp("127.0.0.1", 5514))).unwrap();
        assert_eq!(udp.describe(), "udp 127.0.0.1:5514");
    }

    #[test]
    fn test_open_tls_with_missing_truststore_fails() {
        let mut syslog = SyslogDestination::udp("localhost", 6514);
        syslog.protocol = SyslogProtocol::Tls(TlsOptions {
            message_transfer: MessageTransfer::OctetCounting,
            reconnect_timeout_secs: 15,
            connect_timeout_secs: 5,
            write_timeout_secs: 10,
            truststore: "/nonexistent/ca.pem".into(),
            client_cert: None,
        });

        let err = open(&Destination::Syslog(syslog)).err().unwrap();
        assert!(matches!(err, Error::Tls(_)));
    }
}
