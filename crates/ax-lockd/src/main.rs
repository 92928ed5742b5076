//! axlockd: hold the input lock for ax
//!
//! Launched by `ax lock`; not meant to be run by hand.

use anyhow::{Context, Result};
use axlockd::{Daemon, DaemonConfig, LockdError, Overlay, platform_interceptor};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "axlockd", version, about)]
struct Args {
    /// Seconds until the lock releases itself (capped at 300)
    #[arg(long)]
    timeout: u64,

    /// File that receives the overlay handle once the lock is active
    #[arg(long)]
    handoff: PathBuf,

    /// Socket for command notifications
    #[arg(long, env = "AX_LOCKD_SOCKET", default_value_os_t = ax_protocol::default_socket_path())]
    socket: PathBuf,

    /// Lock state record to clear on exit
    #[arg(long)]
    lock_file: Option<PathBuf>,
}

async fn run(args: Args, overlay: Box<dyn Overlay>) -> Result<ExitCode> {
    let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = terminate.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    };

    let config = DaemonConfig::new(args.timeout, args.handoff, args.socket, args.lock_file);
    let daemon = Daemon::new(config, platform_interceptor(), overlay);

    match daemon.run(shutdown).await {
        Ok(reason) => {
            tracing::info!(?reason, "axlockd exiting");
            Ok(ExitCode::SUCCESS)
        }
        Err(LockdError::Hook(e)) => {
            eprintln!("axlockd: {}", e);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("axlockd failed"),
    }
}

fn serve(args: Args, overlay: Box<dyn Overlay>) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(args, overlay))
}

/// AppKit only draws from the main thread, so the daemon moves to a worker
#[cfg(target_os = "macos")]
fn host(args: Args) -> Result<ExitCode> {
    let (overlay, commands) = axlockd::overlay::remote();
    let daemon = std::thread::Builder::new()
        .name("axlockd-daemon".to_string())
        .spawn(move || serve(args, Box::new(overlay)))
        .context("failed to start daemon thread")?;

    axlockd::macos::OverlayHost::new(commands).run();

    daemon
        .join()
        .map_err(|_| anyhow::anyhow!("daemon thread panicked"))?
}

#[cfg(not(target_os = "macos"))]
fn host(args: Args) -> Result<ExitCode> {
    serve(args, Box::new(axlockd::LogOverlay::new()))
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    tracing::info!("starting axlockd (pid {})", std::process::id());

    host(args)
}
