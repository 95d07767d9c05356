//! Logger state: the dispatch flags and the ordered handler references
//!
//! The logger decides whether a record is written at all and in which order
//! handlers see it. Delivery itself is driven by
//! [`AuditLogManager::log`](super::AuditLogManager::log).

use serde::Serialize;

use super::config::LoggerConfig;
use super::record::AuditRecord;
use crate::error::{Error, Result};

/// Top-level audit dispatcher state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuditLogger {
    enabled: bool,
    log_read_only: bool,
    log_boot: bool,
    #[serde(rename = "handlers")]
    handler_refs: Vec<String>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self {
            enabled: true,
            log_read_only: false,
            log_boot: true,
            handler_refs: Vec::new(),
        }
    }
}

impl AuditLogger {
    /// Logger with the default flags and no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether records are written at all
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether read-only records are written
    pub fn logs_read_only(&self) -> bool {
        self.log_read_only
    }

    /// Whether boot records are written
    pub fn logs_boot(&self) -> bool {
        self.log_boot
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_log_read_only(&mut self, log_read_only: bool) {
        self.log_read_only = log_read_only;
    }

    pub(crate) fn set_log_boot(&mut self, log_boot: bool) {
        self.log_boot = log_boot;
    }

    /// Attached handler names in delivery order
    pub fn handler_refs(&self) -> &[String] {
        &self.handler_refs
    }

    /// Whether `name` is attached
    pub fn is_attached(&self, name: &str) -> bool {
        self.handler_refs.iter().any(|h| h == name)
    }

    /// Whether this record passes the logger's filters
    pub fn accepts(&self, record: &AuditRecord) -> bool {
        if !self.enabled {
            return false;
        }
        if record.read_only && !self.log_read_only {
            return false;
        }
        if record.booting && !self.log_boot {
            return false;
        }
        true
    }

    /// Check that `name` can be attached
    pub(crate) fn check_attach(&self, name: &str) -> Result<()> {
        if self.is_attached(name) {
            return Err(Error::Conflict(format!(
                "handler '{}' is already attached to the logger",
                name
            )));
        }
        Ok(())
    }

    /// Check that `name` can be detached
    pub(crate) fn check_detach(&self, name: &str) -> Result<()> {
        if !self.is_attached(name) {
            return Err(Error::NotFound(format!(
                "handler '{}' is not attached to the logger",
                name
            )));
        }
        Ok(())
    }

    /// Append a handler reference; delivery order follows attach order
    pub(crate) fn attach(&mut self, name: &str) -> Result<()> {
        self.check_attach(name)?;
        self.handler_refs.push(name.to_string());
        Ok(())
    }

    /// Remove a handler reference
    pub(crate) fn detach(&mut self, name: &str) -> Result<()> {
        self.check_detach(name)?;
        self.handler_refs.retain(|h| h != name);
        Ok(())
    }

    /// Logger state described by `config`
    ///
    /// References are not checked against any handler registry.
    pub fn from_config(config: &LoggerConfig) -> Self {
        Self {
            enabled: config.enabled,
            log_read_only: config.log_read_only,
            log_boot: config.log_boot,
            handler_refs: config.handlers.clone(),
        }
    }

    /// Current flags as configuration
    pub fn to_config(&self) -> LoggerConfig {
        LoggerConfig {
            enabled: self.enabled,
            log_read_only: self.log_read_only,
            log_boot: self.log_boot,
            handlers: self.handler_refs.clone(),
        }
    }
}
