//! envops-mcp: MCP server exposing preview-environment operations to AI agents
//!
//! Reads JSON-RPC requests line by line from stdin and writes responses to
//! stdout. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use envops_mcp::api::{Backend, HttpRequester, OrgSelection};
use envops_mcp::config;
use envops_mcp::error::ServerError;
use envops_mcp::mcp::server::McpServer;
use envops_mcp::mcp::transport;

/// MCP server exposing preview-environment operations to AI agents.
///
/// Provides tools to list, inspect, restart, stop and rebuild environments,
/// manage volumes and snapshots, and read service logs.
#[derive(Parser, Debug)]
#[command(name = "envops-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// API token (overrides `api.token` from the configuration file)
    #[arg(long, env = "ENVOPS_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber. Stdout carries protocol traffic, so
/// logs go to stderr.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// GPL notice printed to stderr at startup (GPLv3 Section 5d).
fn license_notice() -> String {
    format!(
        "envops-mcp {}  Copyright (C) 2026  The Embedded Society\n\
         This program comes with ABSOLUTELY NO WARRANTY.\n\
         This is free software, licensed under GPL-3.0-or-later.\n\
         Source: {}\n",
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_REPOSITORY")
    )
}

/// Entry point for the envops-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                    eprintln!("Create one based on config/example-config.json");
                }
            }
            return ExitCode::FAILURE;
        }
    };

    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    eprintln!("{}", license_notice());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %cfg.api.base_url,
        org = cfg.api.org.as_deref().unwrap_or("<none>"),
        "Starting envops-mcp server"
    );

    let requester = match HttpRequester::new(&cfg.api, args.api_token) {
        Ok(requester) => requester,
        Err(e) => {
            let e = ServerError::Backend(e);
            error!(error = %e, cause = ?std::error::Error::source(&e), "Startup failed");
            return ExitCode::FAILURE;
        }
    };
    let backend = Backend::new(Arc::new(requester), OrgSelection::new(cfg.api.org.clone()));
    let server = McpServer::new(
        cfg.server.clone(),
        transport::from_settings(&cfg.server),
        backend,
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    info!("MCP server ready, waiting for client connection...");
    let result = runtime.block_on(server.run());
    // Stdin reads run on a blocking thread that cannot be interrupted.
    runtime.shutdown_background();

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn license_notice_names_program_and_license() {
        let notice = license_notice();
        assert!(notice.starts_with(&format!("envops-mcp {}", env!("CARGO_PKG_VERSION"))));
        assert!(notice.contains("ABSOLUTELY NO WARRANTY"));
        assert!(notice.contains("GPL-3.0-or-later"));
        assert!(notice.contains(env!("CARGO_PKG_REPOSITORY")));
    }

    #[test]
    fn quiet_overrides_config_level() {
        assert_eq!(get_log_level(0, true, "debug"), Level::ERROR);
        assert_eq!(get_log_level(0, false, "Info"), Level::INFO);
        assert_eq!(get_log_level(2, false, "error"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "loud"), Level::WARN);
    }
}
