//! Audit-event delivery for a management server
//!
//! Every completed management operation produces one [`AuditRecord`]. The
//! [`AuditLogManager`] filters it through the [`AuditLogger`] flags and fans
//! it out to the attached handlers, each of which renders it with a formatter
//! and writes it to a file or a syslog server.
//!
//! # Architecture
//!
//! Handlers track their own delivery failures and disable themselves after a
//! configurable number of consecutive failures; a recycle (or, for stream
//! transports, a successful reconnect) brings them back. A failing handler
//! never affects its siblings and never surfaces an error to the caller
//! that produced the record.
//!
//! The subsystem is itself managed through [`AuditOperation`]s, each of which
//! is audited like any other operation.

pub mod config;
pub(crate) mod failure_tracker;
pub mod formatter;
pub mod handler;
pub mod logger;
pub mod manager;
pub mod operation;
pub mod record;
pub mod syslog;
pub mod transport;

pub use config::{
    AuditConfig, ClientCertConfig, Destination, FileDestination, HandlerConfig, LoggerConfig,
    StreamOptions, SyslogDestination, SyslogProtocol, TlsOptions,
};
pub use failure_tracker::HandlerState;
pub use formatter::{
    AuditFormatter, FormatterConfig, FormatterFactories, FormatterKind, FormatterProperty,
    JsonFormatter, JsonFormatterOptions,
};
pub use handler::{AuditHandler, Delivery, Endpoint, HandlerRuntime};
pub use logger::AuditLogger;
pub use manager::{AuditLogManager, AuditResource, HandlerResource, OperationResult};
pub use operation::{AuditOperation, HandlerAttribute, LoggerAttribute, OperationContext};
pub use record::{AccessType, AuditRecord, AuditSeverity, RecordPayload, RecordType};
pub use syslog::{SyslogFacility, SyslogFormat, SyslogHeader};
pub use transport::{MessageTransfer, Transport, WriteOutcome};
