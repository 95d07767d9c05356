//! TLS support for syslog streams using rustls
//!
//! The collector is validated against a PEM truststore. A client certificate
//! is only needed when the collector requires mutual authentication.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rustls_pemfile::{certs, private_key};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use super::tcp::Connector;
use crate::audit::config::ClientCertConfig;
use crate::error::{Error, Result, TransportError};

/// Load a rustls [`ClientConfig`] from PEM files
///
/// Every certificate in `truststore` becomes a trust anchor. With
/// `client_cert`, the chain and key are presented to collectors that ask.
pub fn load_client_config(
    truststore: &Path,
    client_cert: Option<&ClientCertConfig>,
) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    for cert in read_certs(truststore)? {
        roots.add(cert).map_err(|e| {
            Error::Tls(format!(
                "Invalid certificate in truststore '{}': {}",
                truststore.display(),
                e
            ))
        })?;
    }

    let builder = ClientConfig::builder().with_root_certificates(roots);
    let config = match client_cert {
        Some(client) => {
            let chain = read_certs(&client.cert_path)?;
            let key = read_key(&client.key_path)?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| Error::Tls(format!("Failed to build TLS client config: {}", e)))?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(Arc::new(config))
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        Error::Tls(format!(
            "Failed to open certificate file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let mut reader = BufReader::new(file);
    let chain = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("Failed to parse certificates: {}", e)))?;

    if chain.is_empty() {
        return Err(Error::Tls(format!(
            "'{}' contains no certificates",
            path.display()
        )));
    }
    Ok(chain)
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        Error::Tls(format!("Failed to open key file '{}': {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);
    private_key(&mut reader)
        .map_err(|e| Error::Tls(format!("Failed to parse private key: {}", e)))?
        .ok_or_else(|| Error::Tls(format!("'{}' contains no private key", path.display())))
}

/// Performs the TLS handshake on new collector connections
#[derive(Clone)]
pub struct TlsConnector {
    connector: tokio_rustls::TlsConnector,
    server_name: ServerName<'static>,
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl TlsConnector {
    /// Create a connector validating the collector as `host`
    pub fn new(config: Arc<ClientConfig>, host: &str) -> Result<Self> {
        let server_name = ServerName::try_from(host)
            .map_err(|e| Error::Tls(format!("Invalid server name '{}': {}", host, e)))?
            .to_owned();
        Ok(Self {
            connector: tokio_rustls::TlsConnector::from(config),
            server_name,
        })
    }
}

#[async_trait]
impl Connector for TlsConnector {
    type Stream = TlsStream<TcpStream>;

    async fn upgrade(&self, tcp: TcpStream) -> std::result::Result<Self::Stream, TransportError> {
        self.connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| TransportError::Tls(format!("handshake failed: {}", e)))
    }

    fn protocol(&self) -> &'static str {
        "tls"
    }
}
