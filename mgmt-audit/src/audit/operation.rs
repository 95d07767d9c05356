//! Administrative operations on the audit subsystem
//!
//! Every operation, successful or not, is itself audited as a `core` record
//! whose single operation descriptor is the serialized operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::{AuditConfig, Destination, HandlerConfig};
use super::formatter::{FormatterConfig, FormatterKind};
use super::record::AccessType;

/// A management operation, tagged by `operation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum AuditOperation {
    /// Define a formatter
    AddFormatter {
        /// Formatter definition
        formatter: FormatterConfig,
    },
    /// Delete a formatter no handler references
    RemoveFormatter {
        /// Formatter name
        name: String,
    },
    /// Replace a formatter's kind and options
    WriteFormatterAttribute {
        /// Formatter name
        name: String,
        /// New kind and options
        value: FormatterKind,
    },
    /// Define a handler
    AddHandler {
        /// Handler definition
        handler: HandlerConfig,
    },
    /// Delete a handler the logger does not reference
    RemoveHandler {
        /// Handler name
        name: String,
    },
    /// Change one handler attribute
    WriteHandlerAttribute {
        /// Handler name
        name: String,
        /// Attribute and value
        attribute: HandlerAttribute,
    },
    /// Append a handler to the logger's delivery list
    AttachHandler {
        /// Handler name
        name: String,
    },
    /// Remove a handler from the logger's delivery list
    DetachHandler {
        /// Handler name
        name: String,
    },
    /// Change one logger flag
    WriteLoggerAttribute {
        /// Attribute and value
        attribute: LoggerAttribute,
    },
    /// Reset a handler's failure state and reopen its transport
    Recycle {
        /// Handler name
        name: String,
    },
    /// Describe the current configuration
    ReadResource {
        /// Include live failure counters
        #[serde(default)]
        include_runtime: bool,
    },
}

/// Writable handler attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerAttribute {
    /// Formatter reference
    Formatter(String),
    /// Failure threshold
    MaxFailureCount(u32),
    /// Transport destination
    Destination(Destination),
}

/// Writable logger attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoggerAttribute {
    /// Master switch
    Enabled(bool),
    /// Record read-only operations
    LogReadOnly(bool),
    /// Record boot operations
    LogBoot(bool),
}

/// Caller details copied into the operation's audit record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationContext {
    /// Authenticated user
    pub user: Option<String>,
    /// Access mechanism
    pub access_type: Option<AccessType>,
    /// Caller address
    pub remote_address: Option<String>,
    /// Domain correlation id
    pub domain_uuid: Option<String>,
}

impl AuditOperation {
    /// Operation name as it appears in descriptors
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddFormatter { .. } => "add-formatter",
            Self::RemoveFormatter { .. } => "remove-formatter",
            Self::WriteFormatterAttribute { .. } => "write-formatter-attribute",
            Self::AddHandler { .. } => "add-handler",
            Self::RemoveHandler { .. } => "remove-handler",
            Self::WriteHandlerAttribute { .. } => "write-handler-attribute",
            Self::AttachHandler { .. } => "attach-handler",
            Self::DetachHandler { .. } => "detach-handler",
            Self::WriteLoggerAttribute { .. } => "write-logger-attribute",
            Self::Recycle { .. } => "recycle",
            Self::ReadResource { .. } => "read-resource",
        }
    }

    /// Whether a successful run leaves the model unchanged
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadResource { .. })
    }

    /// `r/o` of the record written when the operation is rejected
    ///
    /// A rejected removal leaves the model exactly as it was and is recorded
    /// as read-only; rejected additions and writes are not.
    pub fn read_only_on_failure(&self) -> bool {
        matches!(
            self,
            Self::ReadResource { .. } | Self::RemoveFormatter { .. } | Self::RemoveHandler { .. }
        )
    }

    /// Descriptor stored in the audit record's `ops`
    pub fn descriptor(&self) -> Value {
        serde_json::to_value(self)
            .unwrap_or_else(|_| serde_json::json!({ "operation": self.name() }))
    }

    /// Operations that bring an empty subsystem to `config`
    ///
    /// Formatters come first, then handlers, the logger flags and the
    /// attachments. `enabled` is written last so that a disabled logger
    /// still gets the complete configuration.
    pub fn boot_sequence(config: &AuditConfig) -> Vec<AuditOperation> {
        let mut ops = Vec::new();
        ops.extend(
            config
                .formatters
                .iter()
                .cloned()
                .map(|formatter| Self::AddFormatter { formatter }),
        );
        ops.extend(
            config
                .handlers
                .iter()
                .cloned()
                .map(|handler| Self::AddHandler { handler }),
        );
        ops.push(Self::WriteLoggerAttribute {
            attribute: LoggerAttribute::LogReadOnly(config.logger.log_read_only),
        });
        ops.push(Self::WriteLoggerAttribute {
            attribute: LoggerAttribute::LogBoot(config.logger.log_boot),
        });
        ops.extend(
            config
                .logger
                .handlers
                .iter()
                .cloned()
                .map(|name| Self::AttachHandler { name }),
        );
        ops.push(Self::WriteLoggerAttribute {
            attribute: LoggerAttribute::Enabled(config.logger.enabled),
        });
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::config::LoggerConfig;
    use crate::audit::formatter::JsonFormatterOptions;

    #[test]
    fn test_operation_wire_format() {
        let op: AuditOperation = serde_json::from_str(
            r#"{"operation": "write-handler-attribute", "name": "file",
                "attribute": {"max-failure-count": 3}}"#,
        )
        .unwrap();
        assert_eq!(
            op,
            AuditOperation::WriteHandlerAttribute {
                name: "file".into(),
                attribute: HandlerAttribute::MaxFailureCount(3),
            }
        );

        let op: AuditOperation =
            serde_json::from_str(r#"{"operation": "read-resource"}"#).unwrap();
        assert_eq!(op, AuditOperation::ReadResource { include_runtime: false });

        let op: AuditOperation = serde_json::from_str(
            r#"{"operation": "write-logger-attribute", "attribute": {"enabled": false}}"#,
        )
        .unwrap();
        assert_eq!(op.name(), "write-logger-attribute");
    }

    #[test]
    fn test_descriptor_carries_operation_name() {
        let op = AuditOperation::Recycle { name: "file".into() };
        let descriptor = op.descriptor();
        assert_eq!(descriptor["operation"], "recycle");
        assert_eq!(descriptor["name"], "file");
    }

    #[test]
    fn test_read_only_classification() {
        assert!(AuditOperation::ReadResource { include_runtime: true }.is_read_only());
        let remove = AuditOperation::RemoveHandler { name: "h".into() };
        assert!(!remove.is_read_only());
        assert!(remove.read_only_on_failure());
        assert!(!AuditOperation::AttachHandler { name: "h".into() }.read_only_on_failure());
    }

    #[test]
    fn test_boot_sequence_order() {
        let config = AuditConfig {
            logger: LoggerConfig {
                enabled: false,
                handlers: vec!["file".into()],
                ..Default::default()
            },
            formatters: vec![FormatterConfig::json("json", JsonFormatterOptions::default())],
            handlers: vec![HandlerConfig::file("file", "json", "/tmp/audit.log")],
        };

        let names: Vec<&str> = AuditOperation::boot_sequence(&config)
            .iter()
            .map(|op| op.name())
            .collect();
        assert_eq!(
            names,
            [
                "add-formatter",
                "add-handler",
                "write-logger-attribute",
                "write-logger-attribute",
                "attach-handler",
                "write-logger-attribute",
            ]
        );
    }
}
