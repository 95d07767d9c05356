//! Audit record types
//!
//! One [`AuditRecord`] is created per completed top-level management operation
//! (or per boot, covering the whole boot sequence). Records are immutable once
//! handed to the logger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single audit record
///
/// The serialized field names follow the management server's established
/// audit-log layout (`r/o`, `remote-address`, `domainUUID`, ...), so existing
/// log-analysis tooling keeps working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the operation completed
    pub timestamp: DateTime<Utc>,
    /// True if no operation in the set modified the model
    #[serde(rename = "r/o")]
    pub read_only: bool,
    /// True while the server is still processing boot operations
    pub booting: bool,
    /// Server version string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Authenticated user, absent for in-VM callers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Domain-wide operation correlation id
    #[serde(rename = "domainUUID", default, skip_serializing_if = "Option::is_none")]
    pub domain_uuid: Option<String>,
    /// How the caller reached the management layer
    #[serde(rename = "access", default, skip_serializing_if = "Option::is_none")]
    pub access_type: Option<AccessType>,
    /// Caller's network address
    #[serde(rename = "remote-address", default, skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    /// Whether the operation succeeded
    pub success: bool,
    /// Origin-specific payload, tagged by `type`
    #[serde(flatten)]
    pub payload: RecordPayload,
}

/// Origin of an audited operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// Management model operation
    Core,
    /// JMX method invocation
    Jmx,
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Jmx => write!(f, "jmx"),
        }
    }
}

/// Record contents that depend on the origin of the operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordPayload {
    /// Ordered operation descriptors; more than one for composites and boot
    Core {
        /// Operation descriptors
        ops: Vec<Value>,
    },
    /// A JMX method access
    Jmx {
        /// Invoked method name
        method: String,
        /// Parameter type signature
        sig: Vec<String>,
        /// Parameter values (`null` for absent values)
        params: Vec<Value>,
        /// Failure description, if the invocation threw
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Access mechanism of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessType {
    /// Native management protocol
    Native,
    /// HTTP management API
    Http,
    /// JMX
    Jmx,
}

impl AuditRecord {
    /// Create a record for a completed management model operation
    pub fn core(ops: Vec<Value>, read_only: bool, success: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            read_only,
            booting: false,
            version: None,
            user: None,
            domain_uuid: None,
            access_type: None,
            remote_address: None,
            success,
            payload: RecordPayload::Core { ops },
        }
    }

    /// Create a record for a JMX method invocation
    pub fn jmx_method_access(
        method: impl Into<String>,
        sig: Vec<String>,
        params: Vec<Value>,
        error: Option<String>,
        read_only: bool,
    ) -> Self {
        let success = error.is_none();
        Self {
            timestamp: Utc::now(),
            read_only,
            booting: false,
            version: None,
            user: None,
            domain_uuid: None,
            access_type: None,
            remote_address: None,
            success,
            payload: RecordPayload::Jmx {
                method: method.into(),
                sig,
                params,
                error,
            },
        }
    }

    /// Mark the record as produced during boot
    pub fn with_booting(mut self, booting: bool) -> Self {
        self.booting = booting;
        self
    }

    /// Set the server version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set caller identity details
    pub fn with_caller(
        mut self,
        user: Option<String>,
        access_type: Option<AccessType>,
        remote_address: Option<String>,
    ) -> Self {
        self.user = user;
        self.access_type = access_type;
        self.remote_address = remote_address;
        self
    }

    /// Set the domain correlation id
    pub fn with_domain_uuid(mut self, domain_uuid: impl Into<String>) -> Self {
        self.domain_uuid = Some(domain_uuid.into());
        self
    }

    /// Origin of the record
    pub fn record_type(&self) -> RecordType {
        match self.payload {
            RecordPayload::Core { .. } => RecordType::Core,
            RecordPayload::Jmx { .. } => RecordType::Jmx,
        }
    }

    /// Operation descriptors for core records, empty for JMX records
    pub fn operations(&self) -> &[Value] {
        match &self.payload {
            RecordPayload::Core { ops } => ops,
            RecordPayload::Jmx { .. } => &[],
        }
    }

    /// Syslog severity for this record
    pub fn severity(&self) -> AuditSeverity {
        if self.success {
            AuditSeverity::Notice
        } else {
            AuditSeverity::Warning
        }
    }
}

/// Audit record severity levels
///
/// Maps directly to syslog severity values (RFC 5424).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuditSeverity {
    /// System is unusable (syslog 0)
    Emergency = 0,
    /// Action must be taken immediately (syslog 1)
    Alert = 1,
    /// Critical conditions (syslog 2)
    Critical = 2,
    /// Error conditions (syslog 3)
    Error = 3,
    /// Warning conditions (syslog 4)
    Warning = 4,
    /// Normal but significant condition (syslog 5)
    Notice = 5,
    /// Informational messages (syslog 6)
    Informational = 6,
    /// Debug-level messages (syslog 7)
    Debug = 7,
}

impl AuditSeverity {
    /// Get the numeric syslog severity value (0-7)
    pub fn as_syslog_severity(&self) -> u8 {
        *self as u8
    }
}
