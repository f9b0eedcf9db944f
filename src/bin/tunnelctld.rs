//! Tunnel Control Daemon (tunnelctld)
//!
//! Hosts the connection registry for the VPN client service. On start it
//! clears tunnel state left behind by a previous run; on exit it stops every
//! registered connection and clears it again.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (requires root/sudo)
//! sudo tunnelctld
//!
//! # Start with verbose logging and a custom config
//! sudo tunnelctld --verbose --config /etc/tunnelctl/tunnelctld.toml
//!
//! # Print the effective configuration and exit
//! tunnelctld --check-config
//! ```

use anyhow::Context;
use clap::Parser;
use libtunnelctl::config::TunnelctlConfig;
use libtunnelctl::lifecycle::LifecycleOrchestrator;
use libtunnelctl::service::ServiceContext;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Tunnel Control Daemon
#[derive(Parser, Debug)]
#[command(name = "tunnelctld")]
#[command(author = "tunnelctl contributors")]
#[command(version)]
#[command(about = "Tunnel Control Daemon - tracks and cleans up VPN tunnel connections", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file
    #[arg(short, long, default_value = "/etc/tunnelctl/tunnelctld.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = TunnelctlConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if args.check_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(&args, &config);

    info!("Starting Tunnel Control Daemon (tunnelctld)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    #[cfg(unix)]
    {
        let uid = unsafe { libc::getuid() };
        if uid != 0 {
            warn!("Not running as root - platform cleanup may fail");
        }
    }

    let ctx = ServiceContext::new(config);
    let orchestrator = ctx.orchestrator();

    // Residue from a previous run
    if let Err(e) = orchestrator.platform_cleanup().await {
        warn!(error = %e, "Startup adapter cleanup failed");
    }
    ctx.registry().clean_state().await;

    info!("Tunnel Control Daemon is ready");

    if let Err(e) = handle_signals(orchestrator.clone()).await {
        error!(error = %e, "Signal handler error");
    }

    info!("Shutting down Tunnel Control Daemon...");
    if let Err(e) = orchestrator.shutdown().await {
        error!(error = %e, "Error during shutdown");
    }

    info!("Tunnel Control Daemon stopped");
    Ok(())
}

/// Initialize logging from command-line arguments and configuration
fn init_logging(args: &Args, config: &TunnelctlConfig) {
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_deref().unwrap_or(&config.logging.level)
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            EnvFilter::new(format!("tunnelctld={},libtunnelctl={}", log_level, log_level))
        });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .init();
}

/// Wait for a shutdown signal; SIGHUP restarts all connections, SIGUSR1 logs their status
async fn handle_signals(orchestrator: Arc<LifecycleOrchestrator>) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("registering SIGHUP handler")?;
        let mut sigusr1 = signal(SignalKind::user_defined1()).context("registering SIGUSR1 handler")?;

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    return Ok(());
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    return Ok(());
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, restarting connections");
                    if let Err(e) = orchestrator.restart_all().await {
                        error!(error = %e, "Restart failed");
                    }
                }
                _ = sigusr1.recv() => {
                    match orchestrator.status_report().await {
                        Ok(report) if report.is_empty() => info!("No registered connections"),
                        Ok(report) => {
                            for status in report {
                                info!(%status, "Connection status");
                            }
                        }
                        Err(e) => error!(error = %e, "Failed to report connection status"),
                    }
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = orchestrator;
        tokio::signal::ctrl_c().await.context("listening for Ctrl+C")?;
        info!("Received Ctrl+C, initiating graceful shutdown");
        Ok(())
    }
}
