use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;

/// mgmt-audit - deliver management audit records to files and syslog
#[derive(Parser)]
#[command(name = "mgmt-audit")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (skips the config search path)
    #[arg(long, global = true, value_name = "FILE", env = "MGMT_AUDIT_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Service name used to locate config files
    #[arg(long, global = true, value_name = "NAME", default_value = "mgmt-audit")]
    service: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read audit records (JSON lines) from stdin and deliver them
    Log,
    /// Read management operations (JSON lines) from stdin and execute them
    Manage {
        /// User recorded as the caller
        #[arg(long)]
        user: Option<String>,

        /// Remote address recorded as the caller's
        #[arg(long, value_name = "ADDRESS")]
        remote_address: Option<String>,

        /// Stop at the first rejected operation
        #[arg(long)]
        fail_fast: bool,
    },
    /// Validate the audit configuration without writing anything
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let source = commands::ConfigSource {
        path: cli.config,
        service: cli.service,
    };

    let result = match cli.command {
        Commands::Log => commands::log::execute(&source).await,
        Commands::Manage {
            user,
            remote_address,
            fail_fast,
        } => commands::manage::execute(&source, user, remote_address, fail_fast).await,
        Commands::CheckConfig => commands::check_config::execute(&source).await,
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);

            for cause in e.chain().skip(1) {
                eprintln!("\n{} {}", "Caused by:".yellow(), cause);
            }

            std::process::exit(1);
        }
    }
}
