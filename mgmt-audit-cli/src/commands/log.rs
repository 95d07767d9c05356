use anyhow::{Context, Result};
use colored::Colorize;
use mgmt_audit::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::ConfigSource;

pub async fn execute(source: &ConfigSource) -> Result<()> {
    let manager = super::boot(source).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut delivered = 0usize;
    let mut skipped = 0usize;
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(record) => {
                manager.log(record).await;
                delivered += 1;
            }
            Err(e) => {
                eprintln!(
                    "{} line {}: {}",
                    "Skipped".yellow(),
                    line_number,
                    e
                );
                skipped += 1;
            }
        }
    }

    tracing::info!(delivered, skipped, "Audit input drained");
    manager.shutdown().await;
    eprintln!(
        "{} {} record(s) logged, {} skipped",
        "Done:".green().bold(),
        delivered,
        skipped
    );
    Ok(())
}
