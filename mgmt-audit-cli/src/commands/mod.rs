use std::path::PathBuf;

use anyhow::{Context, Result};
use mgmt_audit::prelude::*;

pub mod check_config;
pub mod log;
pub mod manage;

/// Where the configuration comes from
pub struct ConfigSource {
    pub path: Option<PathBuf>,
    pub service: String,
}

impl ConfigSource {
    pub fn load(&self) -> Result<Config> {
        match &self.path {
            Some(path) => Config::load_from(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display())),
            None => Config::load_for_service(&self.service)
                .with_context(|| format!("Failed to load configuration for {}", self.service)),
        }
    }
}

/// Load the configuration, start diagnostic logging and boot the audit subsystem
pub async fn boot(source: &ConfigSource) -> Result<AuditLogManager> {
    let config = source.load()?;
    init_tracing(&config)?;

    let manager = manager_for(&config);
    manager
        .boot_from_config(&config.audit)
        .await
        .context("Audit configuration rejected")?;
    Ok(manager)
}

pub fn manager_for(config: &Config) -> AuditLogManager {
    let manager = AuditLogManager::new();
    match &config.service.version {
        Some(version) => manager.with_version(version.clone()),
        None => manager.with_version(env!("CARGO_PKG_VERSION")),
    }
}
