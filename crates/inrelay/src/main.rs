// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! inrelay - relays inReach media from a messenger app to webhooks and email.
//!
//! This is the binary entry point for the relay daemon.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};

mod serve;
mod shutdown;
mod status;

/// inrelay - relays inReach media from a messenger app to webhooks and email.
#[derive(Parser, Debug)]
#[command(name = "inrelay", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the relay daemon.
    Serve,
    /// Show daemon health and subscription counts.
    Status {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration (secrets redacted).
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup.
    let config = match inrelay_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            inrelay_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { json }) => status::run_status(&config, json).await,
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("inrelay: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Print the merged configuration as TOML with secrets redacted.
fn print_config(config: &inrelay_config::RelayConfig) -> Result<(), inrelay_core::RelayError> {
    let mut redacted = config.clone();
    if redacted.provision.secret.is_some() {
        redacted.provision.secret = Some("[redacted]".to_string());
    }
    if redacted.smtp.password.is_some() {
        redacted.smtp.password = Some("[redacted]".to_string());
    }
    if redacted.routing.catch_all_bearer_token.is_some() {
        redacted.routing.catch_all_bearer_token = Some("[redacted]".to_string());
    }
    let rendered = toml::to_string_pretty(&redacted)
        .map_err(|e| inrelay_core::RelayError::Internal(format!("failed to render config: {e}")))?;
    println!("{rendered}");
    Ok(())
}
