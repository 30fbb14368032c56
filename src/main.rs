//! autocad-mcp: MCP server for AI-assisted drafting in AutoCAD
//!
//! Reads JSON-RPC messages on stdin, writes replies on stdout and logs to
//! stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use autocad_mcp::cad::{
    Connector, DetachedConnector, DrawingService, Executor, MemoryConnector, MemoryHost,
};
use autocad_mcp::config::{self, Backend, Config, HostConfig};
use autocad_mcp::error::StartupError;
use autocad_mcp::mcp::server::McpServer;

/// MCP server for AI-assisted drafting in AutoCAD.
///
/// Exposes drawing queries, primitive and structure creation, and entity
/// deletion as tools for AI assistants.
#[derive(Parser, Debug)]
#[command(name = "autocad-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Picks the log level. `-q` wins, then `-v` flags, then the configured
/// level. An unrecognised configured level falls back to warn.
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => config_level.parse().unwrap_or(Level::WARN),
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber. stdout is the MCP channel, so logs go
/// to stderr.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the connector for the configured backend.
fn connector(host: &HostConfig) -> Box<dyn Connector> {
    match host.backend {
        Backend::Detached => Box::new(DetachedConnector),
        Backend::Memory => Box::new(MemoryConnector::new(MemoryHost::new())),
        Backend::Com => com_connector(host),
    }
}

#[cfg(windows)]
fn com_connector(host: &HostConfig) -> Box<dyn Connector> {
    Box::new(autocad_mcp::cad::com::ComConnector::new(
        host.prog_id.clone(),
        host.startup_wait(),
    ))
}

#[cfg(not(windows))]
fn com_connector(host: &HostConfig) -> Box<dyn Connector> {
    tracing::warn!(
        prog_id = %host.prog_id,
        "COM automation is only available on Windows, running detached"
    );
    Box::new(DetachedConnector)
}

/// Builds the drawing service and serves MCP on stdio until shutdown.
fn serve(cfg: &Config) -> Result<(), StartupError> {
    let service = DrawingService::new(
        connector(&cfg.host),
        Executor::new(cfg.host.settle_delay()),
        cfg.host.scan_pacing(),
    );
    let mut server = McpServer::new(service);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(StartupError::Runtime)?;

    info!("MCP server ready, waiting for client connection...");
    runtime
        .block_on(server.run())
        .map_err(StartupError::Transport)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let cfg = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", StartupError::from(e));
            if args.config.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("Default configuration: {}", default_path.display());
                    eprintln!("See config/example-config.json for the format");
                }
            }
            return ExitCode::FAILURE;
        }
    };

    init_tracing(get_log_level(args.verbose, args.quiet, &cfg.logging.level));
    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?cfg.host.backend,
        settle_delay_ms = cfg.host.settle_delay_ms,
        "Starting autocad-mcp"
    );

    match serve(&cfg) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, cause = ?std::error::Error::source(&e), "Server stopped");
            ExitCode::FAILURE
        }
    }
}
