//! # mgmt-audit
//!
//! Audit-event delivery for management servers. Every management operation
//! executed against the server's configuration model is recorded, whether it
//! succeeded or not, and delivered to a local file and any number of syslog
//! collectors over UDP, TCP or TLS.
//!
//! ## Features
//!
//! - **Independent handlers**: each destination has its own formatter,
//!   transport and failure accounting; one dead collector never blocks another
//! - **Bounded failure tolerance**: a handler disables itself after
//!   `max_failure_count` consecutive failures until recycled or reconnected
//! - **Syslog**: RFC 3164 and RFC 5424 headers, octet-counting or
//!   non-transparent framing, TLS with optional client certificates
//! - **Self-auditing management**: changes to the audit configuration are
//!   audited through the subsystem they change
//!
//! ## Example
//!
//! ```rust,no_run
//! use mgmt_audit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let manager = AuditLogManager::new();
//!     manager.boot_from_config(&config.audit).await?;
//!
//!     manager
//!         .log(AuditRecord::core(
//!             vec![serde_json::json!({"operation": "add", "address": "/subsystem=web"})],
//!             false,
//!             true,
//!         ))
//!         .await;
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod observability;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{
        AccessType, AuditConfig, AuditFormatter, AuditLogManager, AuditOperation, AuditRecord,
        AuditResource, Destination, FormatterConfig, FormatterFactories, HandlerAttribute,
        HandlerConfig, JsonFormatterOptions, LoggerAttribute, OperationContext, OperationResult,
        SyslogDestination,
    };
    pub use crate::config::{Config, LogFormat, ServiceConfig};
    pub use crate::error::{Error, Result};
    pub use crate::observability::init_tracing;
}
