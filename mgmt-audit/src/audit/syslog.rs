//! Syslog message envelopes (RFC 3164 and RFC 5424)
//!
//! Wraps a formatter's payload in a syslog header. No external syslog crate is
//! used; both header formats are simple enough to generate directly. Framing
//! for stream transports lives in [`transport::framing`](super::transport::framing).

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

use super::record::AuditRecord;

/// Private enterprise number used for the structured-data element
const SD_ID: &str = "audit@49610";

/// Syslog header format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyslogFormat {
    /// BSD syslog
    #[serde(rename = "RFC3164", alias = "rfc3164")]
    Rfc3164,
    /// IETF syslog with structured data
    #[default]
    #[serde(rename = "RFC5424", alias = "rfc5424")]
    Rfc5424,
}

impl SyslogFormat {
    /// Default maximum message length for this format
    pub fn default_max_length(&self) -> usize {
        match self {
            Self::Rfc3164 => 1024,
            Self::Rfc5424 => 2048,
        }
    }
}

/// Syslog facilities as defined by RFC 5424
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyslogFacility {
    Kernel = 0,
    #[default]
    UserLevel = 1,
    MailSystem = 2,
    SystemDaemons = 3,
    Security = 4,
    SyslogdInternal = 5,
    LinePrinter = 6,
    NetworkNews = 7,
    Uucp = 8,
    ClockDaemon = 9,
    #[serde(rename = "security-2")]
    Security2 = 10,
    FtpDaemon = 11,
    Ntp = 12,
    LogAudit = 13,
    LogAlert = 14,
    #[serde(rename = "clock-daemon-2")]
    ClockDaemon2 = 15,
    #[serde(rename = "local-use-0")]
    LocalUse0 = 16,
    #[serde(rename = "local-use-1")]
    LocalUse1 = 17,
    #[serde(rename = "local-use-2")]
    LocalUse2 = 18,
    #[serde(rename = "local-use-3")]
    LocalUse3 = 19,
    #[serde(rename = "local-use-4")]
    LocalUse4 = 20,
    #[serde(rename = "local-use-5")]
    LocalUse5 = 21,
    #[serde(rename = "local-use-6")]
    LocalUse6 = 22,
    #[serde(rename = "local-use-7")]
    LocalUse7 = 23,
}

impl SyslogFacility {
    /// Numeric facility code
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Builds syslog messages for one handler
#[derive(Debug, Clone)]
pub struct SyslogHeader {
    format: SyslogFormat,
    facility: SyslogFacility,
    app_name: String,
    hostname: String,
    max_length: usize,
    truncate: bool,
    pid: u32,
}

impl SyslogHeader {
    /// Create a header builder
    ///
    /// `max_length` defaults to the format's conventional limit.
    pub fn new(
        format: SyslogFormat,
        facility: SyslogFacility,
        app_name: impl Into<String>,
        hostname: impl Into<String>,
        max_length: Option<usize>,
        truncate: bool,
    ) -> Self {
        Self {
            format,
            facility,
            app_name: app_name.into(),
            hostname: hostname.into(),
            max_length: max_length.unwrap_or_else(|| format.default_max_length()),
            truncate,
            pid: std::process::id(),
        }
    }

    /// Header format in use
    pub fn format(&self) -> SyslogFormat {
        self.format
    }

    /// Wrap a formatted payload in a syslog header
    pub fn wrap(&self, record: &AuditRecord, payload: &str) -> String {
        let message = match self.format {
            SyslogFormat::Rfc3164 => self.format_rfc3164(record, payload),
            SyslogFormat::Rfc5424 => self.format_rfc5424(record, payload),
        };
        if self.truncate {
            truncate_utf8(message, self.max_length)
        } else {
            message
        }
    }

    fn priority(&self, record: &AuditRecord) -> u16 {
        // PRI = facility * 8 + severity
        (self.facility.code() as u16) * 8 + record.severity().as_syslog_severity() as u16
    }

    /// Format: `<PRI>Mmm dd hh:mm:ss HOSTNAME TAG[PID]: MSG`
    fn format_rfc3164(&self, record: &AuditRecord, payload: &str) -> String {
        let timestamp = record.timestamp.with_timezone(&Local).format("%b %e %H:%M:%S");
        format!(
            "<{}>{} {} {}[{}]: {}",
            self.priority(record),
            timestamp,
            self.hostname,
            self.app_name,
            self.pid,
            payload
        )
    }

    /// Format: `<PRI>VERSION TIMESTAMP HOSTNAME APP-NAME PROCID MSGID [SD-ID SD-PARAM...] MSG`
    fn format_rfc5424(&self, record: &AuditRecord, payload: &str) -> String {
        let timestamp = record
            .timestamp
            .with_timezone(&Utc)
            .format("%Y-%m-%dT%H:%M:%S%.6fZ");

        let mut sd_params = vec![
            format!("type=\"{}\"", record.record_type()),
            format!("r/o=\"{}\"", record.read_only),
            format!("booting=\"{}\"", record.booting),
            format!("success=\"{}\"", record.success),
        ];
        if let Some(ref user) = record.user {
            sd_params.push(format!("user=\"{}\"", escape_sd_value(user)));
        }
        if let Some(ref addr) = record.remote_address {
            sd_params.push(format!("remote-address=\"{}\"", escape_sd_value(addr)));
        }

        format!(
            "<{}>1 {} {} {} {} {} [{} {}] {}",
            self.priority(record),
            timestamp,
            self.hostname,
            self.app_name,
            self.pid,
            record.record_type(),
            SD_ID,
            sd_params.join(" "),
            payload
        )
    }
}

/// Escape special characters in structured data values per RFC 5424
fn escape_sd_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(']', "\\]")
}

fn truncate_utf8(mut message: String, max_length: usize) -> String {
    if message.len() <= max_length {
        return message;
    }
    let mut cut = max_length;
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    message.truncate(cut);
    message
}

/// Host name reported in syslog headers when none is configured
pub fn default_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
