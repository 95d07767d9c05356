//! Audit logging configuration
//!
//! Loaded from the `[audit]` section of config.toml or environment variables,
//! and used as the payload of handler management operations.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::formatter::FormatterConfig;
use super::syslog::{SyslogFacility, SyslogFormat};
use super::transport::MessageTransfer;
use crate::error::{Error, Result};

/// Audit subsystem configuration
///
/// Everything in here is applied as boot operations, so the first record
/// written after startup describes this configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Logger flags and attached handler references
    #[serde(default)]
    pub logger: LoggerConfig,

    /// Formatter definitions
    #[serde(default)]
    pub formatters: Vec<FormatterConfig>,

    /// Handler definitions
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Enable audit logging (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Record read-only operations (default: false)
    #[serde(default)]
    pub log_read_only: bool,

    /// Record the boot operations (default: true)
    #[serde(default = "default_true")]
    pub log_boot: bool,

    /// Attached handlers, in delivery order
    #[serde(default)]
    pub handlers: Vec<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_read_only: false,
            log_boot: true,
            handlers: Vec::new(),
        }
    }
}

/// A named handler: one formatter bound to one destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Unique handler name
    pub name: String,

    /// Name of the formatter used to render records
    pub formatter: String,

    /// Failures tolerated before the handler disables itself (0 = never)
    #[serde(default = "default_max_failure_count")]
    pub max_failure_count: u32,

    /// Where records are written
    pub destination: Destination,
}

impl HandlerConfig {
    /// A file handler
    pub fn file(
        name: impl Into<String>,
        formatter: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            formatter: formatter.into(),
            max_failure_count: default_max_failure_count(),
            destination: Destination::File(FileDestination {
                path: path.into(),
                relative_to: None,
            }),
        }
    }

    /// A syslog handler
    pub fn syslog(
        name: impl Into<String>,
        formatter: impl Into<String>,
        destination: SyslogDestination,
    ) -> Self {
        Self {
            name: name.into(),
            formatter: formatter.into(),
            max_failure_count: default_max_failure_count(),
            destination: Destination::Syslog(destination),
        }
    }

    /// Set the failure threshold
    pub fn with_max_failure_count(mut self, max_failure_count: u32) -> Self {
        self.max_failure_count = max_failure_count;
        self
    }

    /// Check attribute values that cannot be expressed in the types
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ValidationError("handler name must not be empty".into()));
        }
        if self.formatter.trim().is_empty() {
            return Err(Error::ValidationError(format!(
                "handler '{}' must reference a formatter",
                self.name
            )));
        }
        self.destination.validate()
    }
}

/// Handler destination, tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Destination {
    /// Append to a local file
    File(FileDestination),
    /// Send to a syslog collector
    Syslog(SyslogDestination),
}

impl Destination {
    /// Check attribute values that cannot be expressed in the types
    pub fn validate(&self) -> Result<()> {
        match self {
            Destination::File(file) => {
                if file.path.as_os_str().is_empty() {
                    return Err(Error::ValidationError("file path must not be empty".into()));
                }
                Ok(())
            }
            Destination::Syslog(syslog) => {
                if syslog.host.trim().is_empty() {
                    return Err(Error::ValidationError("syslog host must not be empty".into()));
                }
                if syslog.port == 0 {
                    return Err(Error::ValidationError("syslog port must not be 0".into()));
                }
                if syslog.max_length == Some(0) {
                    return Err(Error::ValidationError("max-length must be positive".into()));
                }
                check_header_field("app_name", &syslog.app_name, MAX_APP_NAME_LEN)?;
                if let Some(hostname) = &syslog.hostname {
                    check_header_field("hostname", hostname, MAX_HOSTNAME_LEN)?;
                }
                match &syslog.protocol {
                    SyslogProtocol::Udp => Ok(()),
                    SyslogProtocol::Tcp(options) => options.validate(),
                    SyslogProtocol::Tls(tls) => tls.stream_options().validate(),
                }
            }
        }
    }
}

/// RFC 5424 APP-NAME length limit
const MAX_APP_NAME_LEN: usize = 48;
/// RFC 5424 HOSTNAME length limit
const MAX_HOSTNAME_LEN: usize = 255;

/// Syslog header fields are 1..=max printable US-ASCII characters, no spaces
fn check_header_field(field: &str, value: &str, max: usize) -> Result<()> {
    if value.is_empty() || value.len() > max {
        return Err(Error::ValidationError(format!(
            "{} must be 1 to {} characters",
            field, max
        )));
    }
    if !value.bytes().all(|b| (33..=126).contains(&b)) {
        return Err(Error::ValidationError(format!(
            "{} '{}' must be printable ASCII without spaces",
            field, value
        )));
    }
    Ok(())
}

/// Local file destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDestination {
    /// File path; relative paths are resolved against `relative_to`
    pub path: PathBuf,

    /// Base directory for relative paths
    #[serde(default)]
    pub relative_to: Option<PathBuf>,
}

impl FileDestination {
    /// Path the transport writes to
    pub fn resolved_path(&self) -> PathBuf {
        match &self.relative_to {
            Some(base) if self.path.is_relative() => base.join(&self.path),
            _ => self.path.clone(),
        }
    }
}

/// Syslog destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyslogDestination {
    /// Collector host name or address
    #[serde(default = "default_syslog_host")]
    pub host: String,

    /// Collector port
    #[serde(default = "default_syslog_port")]
    pub port: u16,

    /// Transport protocol and its options
    #[serde(default)]
    pub protocol: SyslogProtocol,

    /// Header format (default: RFC5424)
    #[serde(default)]
    pub syslog_format: SyslogFormat,

    /// Syslog facility (default: user-level)
    #[serde(default)]
    pub facility: SyslogFacility,

    /// Application name in syslog headers
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Host name in syslog headers (default: `$HOSTNAME`)
    #[serde(default)]
    pub hostname: Option<String>,

    /// Maximum message length (default depends on the format)
    #[serde(default)]
    pub max_length: Option<usize>,

    /// Cut messages longer than `max_length`
    #[serde(default)]
    pub truncate: bool,
}

impl SyslogDestination {
    /// UDP collector with default options
    pub fn udp(host: impl Into<String>, port: u16) -> Self {
        Self::with_protocol(host, port, SyslogProtocol::Udp)
    }

    /// TCP collector with default options
    pub fn tcp(host: impl Into<String>, port: u16, options: StreamOptions) -> Self {
        Self::with_protocol(host, port, SyslogProtocol::Tcp(options))
    }

    fn with_protocol(host: impl Into<String>, port: u16, protocol: SyslogProtocol) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
            syslog_format: SyslogFormat::default(),
            facility: SyslogFacility::default(),
            app_name: default_app_name(),
            hostname: None,
            max_length: None,
            truncate: false,
        }
    }

    /// `host:port` of the collector
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for SyslogDestination {
    fn default() -> Self {
        Self::udp(default_syslog_host(), default_syslog_port())
    }
}

/// Syslog transport protocol, tagged by `transport`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum SyslogProtocol {
    /// One datagram per record
    #[default]
    Udp,
    /// Plain TCP stream
    Tcp(StreamOptions),
    /// TCP stream wrapped in TLS
    Tls(TlsOptions),
}

/// Options shared by stream transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Wire framing
    #[serde(default)]
    pub message_transfer: MessageTransfer,

    /// Seconds between reconnect attempts after a failure
    #[serde(default = "default_reconnect_timeout_secs")]
    pub reconnect_timeout_secs: u64,

    /// Seconds allowed for connecting (and the TLS handshake)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Seconds allowed for writing one message
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            message_transfer: MessageTransfer::default(),
            reconnect_timeout_secs: default_reconnect_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

impl StreamOptions {
    /// Reconnect gate as a duration
    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnect_timeout_secs)
    }

    /// Connect timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Write timeout as a duration
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 {
            return Err(Error::ValidationError(
                "connect_timeout_secs must be positive".into(),
            ));
        }
        if self.write_timeout_secs == 0 {
            return Err(Error::ValidationError(
                "write_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// TLS stream options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOptions {
    /// Wire framing
    #[serde(default)]
    pub message_transfer: MessageTransfer,

    /// Seconds between reconnect attempts after a failure
    #[serde(default = "default_reconnect_timeout_secs")]
    pub reconnect_timeout_secs: u64,

    /// Seconds allowed for connecting and the handshake
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Seconds allowed for writing one message
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    /// PEM file with the CA certificates trusted for the collector
    pub truststore: PathBuf,

    /// Client certificate for mutual authentication
    #[serde(default)]
    pub client_cert: Option<ClientCertConfig>,
}

impl TlsOptions {
    /// The stream options part of the TLS configuration
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            message_transfer: self.message_transfer,
            reconnect_timeout_secs: self.reconnect_timeout_secs,
            connect_timeout_secs: self.connect_timeout_secs,
            write_timeout_secs: self.write_timeout_secs,
        }
    }
}

/// PEM client certificate chain and private key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCertConfig {
    /// Certificate chain
    pub cert_path: PathBuf,
    /// Private key
    pub key_path: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_max_failure_count() -> u32 {
    10
}

fn default_syslog_host() -> String {
    "localhost".to_string()
}

fn default_syslog_port() -> u16 {
    514
}

fn default_app_name() -> String {
    "mgmt-audit".to_string()
}

fn default_reconnect_timeout_secs() -> u64 {
    15
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_write_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_config_defaults() {
        let config = LoggerConfig::default();
        assert!(config.enabled);
        assert!(!config.log_read_only);
        assert!(config.log_boot);
        assert!(config.handlers.is_empty());
    }

    #[test]
    fn test_handler_defaults_from_json() {
        let handler: HandlerConfig = serde_json::from_str(
            r#"{
                "name": "remote",
                "formatter": "json",
                "destination": {"type": "syslog", "host": "10.0.0.1",
                                "protocol": {"transport": "tcp"}}
            }"#,
        )
        .unwrap();

        assert_eq!(handler.max_failure_count, 10);
        match handler.destination {
            Destination::Syslog(syslog) => {
                assert_eq!(syslog.port, 514);
                assert_eq!(syslog.app_name, "mgmt-audit");
                assert_eq!(syslog.syslog_format, SyslogFormat::Rfc5424);
                assert!(!syslog.truncate);
                match syslog.protocol {
                    SyslogProtocol::Tcp(options) => {
                        assert_eq!(options.message_transfer, MessageTransfer::OctetCounting);
                        assert_eq!(options.reconnect_timeout(), Duration::from_secs(15));
                        assert_eq!(options.connect_timeout(), Duration::from_secs(5));
                        assert_eq!(options.write_timeout(), Duration::from_secs(10));
                    }
                    other => panic!("expected tcp, got {:?}", other),
                }
            }
            other => panic!("expected syslog, got {:?}", other),
        }
    }

    #[test]
    fn test_tls_protocol_from_json() {
        let protocol: SyslogProtocol = serde_json::from_str(
            r#"{"transport": "tls", "truststore": "/etc/ca.pem",
                "message_transfer": "non-transparent-framing",
                "client_cert": {"cert_path": "c.pem", "key_path": "k.pem"}}"#,
        )
        .unwrap();

        match protocol {
            SyslogProtocol::Tls(tls) => {
                assert_eq!(tls.truststore, PathBuf::from("/etc/ca.pem"));
                assert_eq!(
                    tls.stream_options().message_transfer,
                    MessageTransfer::NonTransparentFraming
                );
                assert!(tls.client_cert.is_some());
            }
            other => panic!("expected tls, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_file_path() {
        let file = FileDestination {
            path: PathBuf::from("audit.log"),
            relative_to: Some(PathBuf::from("/var/log/server")),
        };
        assert_eq!(file.resolved_path(), PathBuf::from("/var/log/server/audit.log"));

        let absolute = FileDestination {
            path: PathBuf::from("/tmp/audit.log"),
            relative_to: Some(PathBuf::from("/var/log/server")),
        };
        assert_eq!(absolute.resolved_path(), PathBuf::from("/tmp/audit.log"));
    }

    #[test]
    fn test_validation() {
        let mut syslog = SyslogDestination::udp("localhost", 514);
        assert!(Destination::Syslog(syslog.clone()).validate().is_ok());

        syslog.port = 0;
        assert!(matches!(
            Destination::Syslog(syslog).validate(),
            Err(Error::ValidationError(_))
        ));

        let handler = HandlerConfig::file("", "json", "/tmp/a.log");
        assert!(handler.validate().is_err());
    }

    #[test]
    fn test_syslog_header_fields_validated() {
        let mut syslog = SyslogDestination::udp("localhost", 514);
        syslog.app_name = "audit log".into();
        assert!(Destination::Syslog(syslog.clone()).validate().is_err());

        syslog.app_name = "a".repeat(49);
        assert!(Destination::Syslog(syslog.clone()).validate().is_err());

        syslog.app_name = "a".repeat(48);
        assert!(Destination::Syslog(syslog.clone()).validate().is_ok());

        syslog.hostname = Some("host\tname".into());
        assert!(Destination::Syslog(syslog.clone()).validate().is_err());

        syslog.hostname = Some("héte".into());
        assert!(Destination::Syslog(syslog.clone()).validate().is_err());

        syslog.hostname = Some("audit-01.example.com".into());
        assert!(Destination::Syslog(syslog).validate().is_ok());
    }

    #[test]
    fn test_stream_timeouts_must_be_positive() {
        let mut options = StreamOptions::default();
        assert!(Destination::Syslog(SyslogDestination::tcp("localhost", 514, options))
            .validate()
            .is_ok());

        options.connect_timeout_secs = 0;
        assert!(matches!(
            Destination::Syslog(SyslogDestination::tcp("localhost", 514, options)).validate(),
            Err(Error::ValidationError(_))
        ));

        options.connect_timeout_secs = 5;
        options.write_timeout_secs = 0;
        assert!(Destination::Syslog(SyslogDestination::tcp("localhost", 514, options))
            .validate()
            .is_err());

        let mut syslog = SyslogDestination::udp("localhost", 6514);
        syslog.protocol = SyslogProtocol::Tls(TlsOptions {
            message_transfer: MessageTransfer::OctetCounting,
            reconnect_timeout_secs: 15,
            connect_timeout_secs: 0,
            write_timeout_secs: 10,
            truststore: "/etc/ca.pem".into(),
            client_cert: None,
        });
        assert!(Destination::Syslog(syslog).validate().is_err());
    }
}
