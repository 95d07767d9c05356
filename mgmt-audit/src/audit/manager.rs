//! The audit log manager: owned registry, dispatch and management operations
//!
//! [`AuditLogManager`] owns every formatter and handler by name together with
//! the logger state. There is no global state; whoever embeds the audit
//! subsystem holds the manager and passes it where records are produced.
//!
//! # Ordering
//!
//! `log`, `execute` and `boot` are serialized by one async dispatch lock, so
//! records reach handlers in the order they were submitted and handlers
//! observing the same record see it in attachment order. Registry state sits
//! behind a `std::sync::Mutex` that is never held across an `.await`.
//!
//! # When changes take effect
//!
//! An operation's own record is written between two phases. Changes that
//! make a destination available (add, attach, formatter writes, enabling the
//! logger, recycle) are applied before the record, so the operation is visible
//! at that destination. Changes that take one away (detach, remove, replacing
//! a destination, disabling the logger) are applied after it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::config::{AuditConfig, Destination, HandlerConfig};
use super::formatter::{AuditFormatter, FormatterConfig, FormatterFactories};
use super::handler::{AuditHandler, Delivery, Endpoint, HandlerRuntime};
use super::logger::AuditLogger;
use super::operation::{AuditOperation, HandlerAttribute, LoggerAttribute, OperationContext};
use super::record::AuditRecord;
use crate::error::{Error, Result};

struct FormatterEntry {
    config: FormatterConfig,
    formatter: Arc<dyn AuditFormatter>,
}

struct HandlerEntry {
    config: HandlerConfig,
    handler: Arc<AuditHandler>,
}

#[derive(Default)]
struct Registry {
    formatters: BTreeMap<String, FormatterEntry>,
    handlers: BTreeMap<String, HandlerEntry>,
    logger: AuditLogger,
}

impl Registry {
    fn formatter(&self, name: &str) -> Result<&FormatterEntry> {
        self.formatters
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("formatter '{}'", name)))
    }

    fn handler(&self, name: &str) -> Result<&HandlerEntry> {
        self.handlers
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("handler '{}'", name)))
    }

    fn handler_mut(&mut self, name: &str) -> Result<&mut HandlerEntry> {
        self.handlers
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("handler '{}'", name)))
    }
}

/// Handler changes applied before the operation's record is written
enum Action {
    SetFormatter(Arc<AuditHandler>, Arc<dyn AuditFormatter>),
    SetMaxFailureCount(Arc<AuditHandler>, u32),
    Recycle(Arc<AuditHandler>),
}

/// Changes applied after the operation's record is written
enum Deferred {
    Detach(String),
    DisableLogger,
    RemoveHandler(String),
    RemoveFormatter(String),
    ReplaceDestination {
        name: String,
        destination: Destination,
        endpoint: Endpoint,
    },
}

#[derive(Default)]
struct Plan {
    before: Vec<Action>,
    after: Vec<Deferred>,
}

/// Successful outcome of a management operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationResult {
    /// The change was applied
    Applied,
    /// Result of a read-resource
    Resource(AuditResource),
}

/// Description of the audit subsystem returned by read-resource
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuditResource {
    /// Logger flags and references
    pub logger: AuditLogger,
    /// Formatter definitions, by name
    pub formatters: Vec<FormatterConfig>,
    /// Handlers, by name
    pub handlers: Vec<HandlerResource>,
}

/// One handler in a read-resource result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HandlerResource {
    /// Handler name
    pub name: String,
    /// Referenced formatter
    pub formatter: String,
    /// Failure threshold
    pub max_failure_count: u32,
    /// Transport destination
    pub destination: Destination,
    /// Live failure count, with runtime values only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<u32>,
    /// Live disabled flag, with runtime values only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_due_to_failure: Option<bool>,
}

impl AuditResource {
    /// Look up a handler by name
    pub fn handler(&self, name: &str) -> Option<&HandlerResource> {
        self.handlers.iter().find(|h| h.name == name)
    }
}

/// Owner of the audit formatters, handlers and logger
pub struct AuditLogManager {
    registry: Mutex<Registry>,
    dispatch: tokio::sync::Mutex<()>,
    factories: FormatterFactories,
    version: Option<String>,
}

impl std::fmt::Debug for AuditLogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry();
        f.debug_struct("AuditLogManager")
            .field("formatters", &registry.formatters.keys().collect::<Vec<_>>())
            .field("handlers", &registry.handlers.keys().collect::<Vec<_>>())
            .field("logger", &registry.logger)
            .field("version", &self.version)
            .finish()
    }
}

impl Default for AuditLogManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogManager {
    /// Empty manager with an enabled logger and no handlers
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            dispatch: tokio::sync::Mutex::new(()),
            factories: FormatterFactories::new(),
            version: None,
        }
    }

    /// Use these factories for custom formatters
    pub fn with_factories(mut self, factories: FormatterFactories) -> Self {
        self.factories = factories;
        self
    }

    /// Stamp records that carry no version with this one
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a completed operation
    ///
    /// Never fails: each attached handler absorbs its own delivery errors.
    pub async fn log(&self, record: AuditRecord) {
        let _dispatch = self.dispatch.lock().await;
        let record = self.stamp(record);
        self.deliver(&record).await;
    }

    /// Apply the boot operations and write a single boot record
    ///
    /// The record is subject to the logger state the operations produce, so a
    /// configuration that disables the logger or boot logging writes nothing.
    pub async fn boot(&self, ops: Vec<AuditOperation>) -> Result<()> {
        let _dispatch = self.dispatch.lock().await;

        let mut descriptors = Vec::with_capacity(ops.len());
        for op in &ops {
            let plan = self.prepare(op).map_err(|e| {
                tracing::error!(operation = op.name(), "Audit boot operation failed: {}", e);
                e
            })?;
            self.run_actions(plan.before).await;
            self.run_deferred(plan.after).await;
            descriptors.push(op.descriptor());
        }

        tracing::info!(operations = descriptors.len(), "Audit subsystem booted");
        let record = self.stamp(AuditRecord::core(descriptors, false, true).with_booting(true));
        self.deliver(&record).await;
        Ok(())
    }

    /// Boot from configuration
    pub async fn boot_from_config(&self, config: &AuditConfig) -> Result<()> {
        self.boot(AuditOperation::boot_sequence(config)).await
    }

    /// Execute a management operation without caller details
    pub async fn execute(&self, op: AuditOperation) -> Result<OperationResult> {
        self.execute_with(op, &OperationContext::default()).await
    }

    /// Execute a management operation and audit it
    ///
    /// A rejected operation is audited with `success = false` and its error
    /// is returned; the registry is left unchanged.
    pub async fn execute_with(
        &self,
        op: AuditOperation,
        context: &OperationContext,
    ) -> Result<OperationResult> {
        let _dispatch = self.dispatch.lock().await;

        let plan = match self.prepare(&op) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(operation = op.name(), "Audit management operation rejected: {}", e);
                let record = self.operation_record(&op, op.read_only_on_failure(), false, context);
                self.deliver(&record).await;
                return Err(e);
            }
        };

        self.run_actions(plan.before).await;
        let result = match &op {
            AuditOperation::ReadResource { include_runtime } => {
                OperationResult::Resource(self.resource(*include_runtime).await)
            }
            _ => OperationResult::Applied,
        };

        let record = self.operation_record(&op, op.is_read_only(), true, context);
        self.deliver(&record).await;
        self.run_deferred(plan.after).await;

        tracing::debug!(operation = op.name(), "Audit management operation applied");
        Ok(result)
    }

    /// Current configuration, optionally with live failure counters
    ///
    /// Unlike the read-resource operation this is not audited.
    pub async fn resource(&self, include_runtime: bool) -> AuditResource {
        let (logger, formatters, handlers) = {
            let registry = self.registry();
            let formatters: Vec<FormatterConfig> = registry
                .formatters
                .values()
                .map(|entry| entry.config.clone())
                .collect();
            let handlers: Vec<(HandlerConfig, Arc<AuditHandler>)> = registry
                .handlers
                .values()
                .map(|entry| (entry.config.clone(), entry.handler.clone()))
                .collect();
            (registry.logger.clone(), formatters, handlers)
        };

        let mut views = Vec::with_capacity(handlers.len());
        for (config, handler) in handlers {
            let runtime = if include_runtime {
                Some(handler.runtime().await)
            } else {
                None
            };
            views.push(HandlerResource {
                name: config.name,
                formatter: config.formatter,
                max_failure_count: config.max_failure_count,
                destination: config.destination,
                failure_count: runtime.as_ref().map(|r| r.failure_count),
                disabled_due_to_failure: runtime.as_ref().map(|r| r.disabled_due_to_failure),
            });
        }

        AuditResource {
            logger,
            formatters,
            handlers: views,
        }
    }

    /// Live counters of one handler
    pub async fn handler_runtime(&self, name: &str) -> Option<HandlerRuntime> {
        let handler = self.registry().handlers.get(name)?.handler.clone();
        Some(handler.runtime().await)
    }

    /// Current logger state
    pub fn logger(&self) -> AuditLogger {
        self.registry().logger.clone()
    }

    /// Close every handler's transport
    pub async fn shutdown(&self) {
        let _dispatch = self.dispatch.lock().await;
        let handlers: Vec<Arc<AuditHandler>> = self
            .registry()
            .handlers
            .values()
            .map(|entry| entry.handler.clone())
            .collect();
        for handler in handlers {
            handler.close().await;
        }
        tracing::info!("Audit handlers closed");
    }

    fn stamp(&self, mut record: AuditRecord) -> AuditRecord {
        if record.version.is_none() {
            record.version = self.version.clone();
        }
        record
    }

    fn operation_record(
        &self,
        op: &AuditOperation,
        read_only: bool,
        success: bool,
        context: &OperationContext,
    ) -> AuditRecord {
        let mut record = AuditRecord::core(vec![op.descriptor()], read_only, success).with_caller(
            context.user.clone(),
            context.access_type,
            context.remote_address.clone(),
        );
        record.domain_uuid = context.domain_uuid.clone();
        self.stamp(record)
    }

    /// Hand a record to every attached handler, in order
    async fn deliver(&self, record: &AuditRecord) {
        let handlers: Vec<Arc<AuditHandler>> = {
            let registry = self.registry();
            if !registry.logger.accepts(record) {
                return;
            }
            registry
                .logger
                .handler_refs()
                .iter()
                .filter_map(|name| registry.handlers.get(name))
                .map(|entry| entry.handler.clone())
                .collect()
        };

        for handler in handlers {
            if handler.deliver(record).await == Delivery::Failed {
                tracing::debug!(handler = %handler.name(), "Record not delivered");
            }
        }
    }

    /// Validate an operation and apply its immediate registry changes
    fn prepare(&self, op: &AuditOperation) -> Result<Plan> {
        let mut registry = self.registry();
        let mut plan = Plan::default();

        match op {
            AuditOperation::AddFormatter { formatter } => {
                if registry.formatters.contains_key(&formatter.name) {
                    return Err(Error::Conflict(format!(
                        "formatter '{}' already exists",
                        formatter.name
                    )));
                }
                let built = self.factories.build(formatter)?;
                registry.formatters.insert(
                    formatter.name.clone(),
                    FormatterEntry {
                        config: formatter.clone(),
                        formatter: built,
                    },
                );
            }

            AuditOperation::RemoveFormatter { name } => {
                registry.formatter(name)?;
                if let Some(user) = registry.handlers.values().find(|e| &e.config.formatter == name) {
                    return Err(Error::Conflict(format!(
                        "formatter '{}' is referenced by handler '{}'",
                        name, user.config.name
                    )));
                }
                plan.after.push(Deferred::RemoveFormatter(name.clone()));
            }

            AuditOperation::WriteFormatterAttribute { name, value } => {
                registry.formatter(name)?;
                let config = FormatterConfig {
                    name: name.clone(),
                    kind: value.clone(),
                };
                let built = self.factories.build(&config)?;
                for entry in registry.handlers.values().filter(|e| &e.config.formatter == name) {
                    plan.before
                        .push(Action::SetFormatter(entry.handler.clone(), built.clone()));
                }
                registry.formatters.insert(
                    name.clone(),
                    FormatterEntry {
                        config,
                        formatter: built,
                    },
                );
            }

            AuditOperation::AddHandler { handler } => {
                if registry.handlers.contains_key(&handler.name) {
                    return Err(Error::Conflict(format!(
                        "handler '{}' already exists",
                        handler.name
                    )));
                }
                let formatter = registry.formatter(&handler.formatter)?.formatter.clone();
                let built = AuditHandler::from_config(handler, formatter)?;
                registry.handlers.insert(
                    handler.name.clone(),
                    HandlerEntry {
                        config: handler.clone(),
                        handler: Arc::new(built),
                    },
                );
            }

            AuditOperation::RemoveHandler { name } => {
                registry.handler(name)?;
                if registry.logger.is_attached(name) {
                    return Err(Error::Conflict(format!(
                        "handler '{}' is attached to the logger",
                        name
                    )));
                }
                plan.after.push(Deferred::RemoveHandler(name.clone()));
            }

            AuditOperation::WriteHandlerAttribute { name, attribute } => match attribute {
                HandlerAttribute::Formatter(formatter_name) => {
                    let formatter = registry.formatter(formatter_name)?.formatter.clone();
                    let entry = registry.handler_mut(name)?;
                    entry.config.formatter = formatter_name.clone();
                    plan.before
                        .push(Action::SetFormatter(entry.handler.clone(), formatter));
                }
                HandlerAttribute::MaxFailureCount(max) => {
                    let entry = registry.handler_mut(name)?;
                    entry.config.max_failure_count = *max;
                    plan.before
                        .push(Action::SetMaxFailureCount(entry.handler.clone(), *max));
                }
                HandlerAttribute::Destination(destination) => {
                    registry.handler(name)?;
                    destination.validate()?;
                    let endpoint = Endpoint::open(destination)?;
                    plan.after.push(Deferred::ReplaceDestination {
                        name: name.clone(),
                        destination: destination.clone(),
                        endpoint,
                    });
                }
            },

            AuditOperation::AttachHandler { name } => {
                registry.handler(name)?;
                registry.logger.attach(name)?;
            }

            AuditOperation::DetachHandler { name } => {
                registry.logger.check_detach(name)?;
                plan.after.push(Deferred::Detach(name.clone()));
            }

            AuditOperation::WriteLoggerAttribute { attribute } => match attribute {
                LoggerAttribute::Enabled(true) => registry.logger.set_enabled(true),
                LoggerAttribute::Enabled(false) => {
                    if registry.logger.is_enabled() {
                        plan.after.push(Deferred::DisableLogger);
                    }
                }
                LoggerAttribute::LogReadOnly(value) => registry.logger.set_log_read_only(*value),
                LoggerAttribute::LogBoot(value) => registry.logger.set_log_boot(*value),
            },

            AuditOperation::Recycle { name } => {
                let handler = registry.handler(name)?.handler.clone();
                plan.before.push(Action::Recycle(handler));
            }

            AuditOperation::ReadResource { .. } => {}
        }

        Ok(plan)
    }

    async fn run_actions(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::SetFormatter(handler, formatter) => handler.set_formatter(formatter).await,
                Action::SetMaxFailureCount(handler, max) => {
                    handler.set_max_failure_count(max).await
                }
                Action::Recycle(handler) => handler.recycle().await,
            }
        }
    }

    async fn run_deferred(&self, deferred: Vec<Deferred>) {
        for change in deferred {
            match change {
                Deferred::Detach(name) => {
                    if let Err(e) = self.registry().logger.detach(&name) {
                        tracing::warn!(handler = %name, "Detach skipped: {}", e);
                    }
                }
                Deferred::DisableLogger => {
                    self.registry().logger.set_enabled(false);
                    tracing::info!("Audit logging disabled");
                }
                Deferred::RemoveHandler(name) => {
                    let removed = self.registry().handlers.remove(&name);
                    if let Some(entry) = removed {
                        entry.handler.close().await;
                    }
                }
                Deferred::RemoveFormatter(name) => {
                    self.registry().formatters.remove(&name);
                }
                Deferred::ReplaceDestination {
                    name,
                    destination,
                    endpoint,
                } => {
                    let handler = {
                        let mut registry = self.registry();
                        match registry.handlers.get_mut(&name) {
                            Some(entry) => {
                                entry.config.destination = destination;
                                Some(entry.handler.clone())
                            }
                            None => None,
                        }
                    };
                    if let Some(handler) = handler {
                        handler.replace_endpoint(endpoint).await;
                    }
                }
            }
        }
    }
}
