//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: MGMT_AUDIT_, nested keys separated by `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/mgmt-audit/{service_name}/config.toml
//! 4. System directory: /etc/mgmt-audit/{service_name}/config.toml
//! 5. Default values
//!
//! The `[audit]` section is an [`AuditConfig`]; it is applied as the boot
//! operations of the audit subsystem.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audit::AuditConfig;
use crate::error::Result;

const ENV_PREFIX: &str = "MGMT_AUDIT_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Audit subsystem configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Diagnostic log output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Server version stamped on audit records
    #[serde(default)]
    pub version: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            version: None,
        }
    }
}

/// Output format of the diagnostic log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON lines
    #[default]
    Json,
    /// Human-readable text
    Text,
}

fn default_service_name() -> String {
    "mgmt-audit".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from all sources
    ///
    /// The service name is inferred from the binary name.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(default_service_name);

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so that higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the search path; environment variables still override.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Parse configuration from a TOML string, without environment overrides
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml))
            .extract()?;

        Ok(config)
    }

    /// All possible config file paths, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("config.toml"));

        let xdg_dirs = xdg::BaseDirectories::with_prefix("mgmt-audit");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Ok(path) = xdg_dirs.place_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc/mgmt-audit")
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{Destination, FormatterKind, SyslogProtocol};
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.name, "mgmt-audit");
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.service.log_format, LogFormat::Json);
        assert!(config.audit.logger.enabled);
        assert!(config.audit.logger.log_boot);
        assert!(!config.audit.logger.log_read_only);
        assert!(config.audit.handlers.is_empty());
    }

    #[test]
    fn test_audit_section() {
        let config = Config::from_toml(
            r#"
            [service]
            log_level = "debug"
            log_format = "text"

            [audit.logger]
            log_read_only = true
            handlers = ["file", "syslog"]

            [[audit.formatters]]
            name = "json"
            kind = "json"
            compact = true
            escape_new_line = true

            [[audit.handlers]]
            name = "file"
            formatter = "json"
            destination = { type = "file", path = "audit.log", relative_to = "/var/log/mgmt" }

            [[audit.handlers]]
            name = "syslog"
            formatter = "json"
            max_failure_count = 3

            [audit.handlers.destination]
            type = "syslog"
            host = "collector.example.com"
            port = 6514
            syslog_format = "RFC3164"
            facility = "local-use-4"

            [audit.handlers.destination.protocol]
            transport = "tls"
            truststore = "/etc/mgmt-audit/ca.pem"
            message_transfer = "non-transparent-framing"
            "#,
        )
        .unwrap();

        assert_eq!(config.service.log_level, "debug");
        assert_eq!(config.service.log_format, LogFormat::Text);

        let audit = &config.audit;
        assert!(audit.logger.enabled);
        assert!(audit.logger.log_read_only);
        assert_eq!(audit.logger.handlers, ["file", "syslog"]);

        let FormatterKind::Json(options) = &audit.formatters[0].kind else {
            panic!("expected a json formatter");
        };
        assert!(options.compact);
        assert!(options.escape_new_line);
        assert!(options.include_date);

        let file = &audit.handlers[0];
        assert_eq!(file.max_failure_count, 10);
        let Destination::File(dest) = &file.destination else {
            panic!("expected a file destination");
        };
        assert_eq!(dest.resolved_path(), PathBuf::from("/var/log/mgmt/audit.log"));

        let syslog = &audit.handlers[1];
        assert_eq!(syslog.max_failure_count, 3);
        let Destination::Syslog(dest) = &syslog.destination else {
            panic!("expected a syslog destination");
        };
        assert_eq!(dest.address(), "collector.example.com:6514");
        let SyslogProtocol::Tls(tls) = &dest.protocol else {
            panic!("expected tls");
        };
        assert_eq!(tls.reconnect_timeout_secs, 15);
        assert!(tls.client_cert.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [service]
            name = "audit-test"
            version = "26.1.0"

            [audit.logger]
            enabled = false
            "#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.service.name, "audit-test");
        assert_eq!(config.service.version.as_deref(), Some("26.1.0"));
        assert!(!config.audit.logger.enabled);
        assert_eq!(config.service.log_level, "info");
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let err = Config::from_toml(
            r#"
            [[audit.handlers]]
            name = "file"
            formatter = "json"
            max_failure_count = -1
            destination = { type = "file", path = "audit.log" }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }
}
