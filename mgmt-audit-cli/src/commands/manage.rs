use anyhow::{Context, Result};
use colored::Colorize;
use mgmt_audit::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::ConfigSource;

pub async fn execute(
    source: &ConfigSource,
    user: Option<String>,
    remote_address: Option<String>,
    fail_fast: bool,
) -> Result<()> {
    let manager = super::boot(source).await?;
    let context = OperationContext {
        user,
        access_type: Some(AccessType::Native),
        remote_address,
        domain_uuid: None,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut rejected = 0usize;
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let op: AuditOperation = match serde_json::from_str(&line) {
            Ok(op) => op,
            Err(e) => {
                eprintln!("{} line {}: {}", "Invalid:".red(), line_number, e);
                rejected += 1;
                if fail_fast {
                    break;
                }
                continue;
            }
        };

        let name = op.name();
        match manager.execute_with(op, &context).await {
            Ok(OperationResult::Resource(resource)) => {
                let json = serde_json::to_string_pretty(&resource)
                    .context("Failed to serialize resource")?;
                println!("{}", json);
            }
            Ok(OperationResult::Applied) => {
                eprintln!("{} {}", "✓".green(), name);
            }
            Err(e) => {
                tracing::debug!(operation = name, line = line_number, "Operation rejected");
                eprintln!("{} {} (line {}): {}", "✗".red(), name, line_number, e);
                rejected += 1;
                if fail_fast {
                    break;
                }
            }
        }
    }

    manager.shutdown().await;

    if rejected > 0 {
        anyhow::bail!("{} operation(s) rejected", rejected);
    }
    Ok(())
}
