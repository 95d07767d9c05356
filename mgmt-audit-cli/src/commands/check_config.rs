use anyhow::{Context, Result};
use colored::Colorize;

use super::ConfigSource;

/// Apply the configuration to a disabled logger and print the result
///
/// Formatter options, handler references and TLS material are all checked,
/// but the disabled logger writes no boot record and no file is created.
pub async fn execute(source: &ConfigSource) -> Result<()> {
    let config = source.load()?;

    let mut audit = config.audit.clone();
    let enabled = audit.logger.enabled;
    audit.logger.enabled = false;

    let manager = super::manager_for(&config);
    manager
        .boot_from_config(&audit)
        .await
        .context("Audit configuration rejected")?;

    let mut resource = manager.resource(false).await;
    resource.logger = mgmt_audit::audit::AuditLogger::from_config(&config.audit.logger);
    manager.shutdown().await;

    println!(
        "{}",
        serde_json::to_string_pretty(&resource).context("Failed to serialize resource")?
    );
    eprintln!(
        "{} {} formatter(s), {} handler(s), logger {}",
        "Valid:".green().bold(),
        resource.formatters.len(),
        resource.handlers.len(),
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
