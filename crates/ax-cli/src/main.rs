//! ax: address, inspect and drive the live accessibility tree
//!
//! Each invocation runs one command, prints one JSON value on stdout and
//! exits. Failures print a one-line message on stderr and exit with the
//! status of their [`AxError`] kind.

mod address;
mod capture;
mod commands;
mod constants;
mod errors;
mod format;
mod identity;
mod input;
mod keys;
mod lock;
mod names;
mod notify;
mod resolve;
mod snapshot;
mod store;
mod tree;

use capture::SnapshotCapture;
use clap::Parser;
use commands::{Command, Context};
use errors::AxError;
use identity::ElementRegistry;
use input::DeferredSink;
use lock::{DaemonLauncher, LockCoordinator};
use snapshot::SnapshotStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use store::{CapabilityStore, UnavailableStore};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "ax",
    version,
    about,
    after_help = "Without --snapshot there is no accessibility backend and tree queries fail with a permission error."
)]
struct Cli {
    /// Recorded accessibility snapshot (JSON) to serve queries from; required for tree queries
    #[arg(long, global = true, env = "AX_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Lock state record holding the suppressor's pid
    #[arg(long, global = true, env = "AX_LOCK_FILE", default_value_os_t = ax_protocol::default_lock_state_path())]
    lock_file: PathBuf,

    /// Socket the suppressor listens on for command notifications
    #[arg(long, global = true, env = "AX_LOCKD_SOCKET", default_value_os_t = ax_protocol::default_socket_path())]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

async fn run<S: CapabilityStore>(
    store: &S,
    screen: Option<&Path>,
    cli: Cli,
) -> Result<serde_json::Value, AxError> {
    let registry = ElementRegistry::new();
    let capture = SnapshotCapture::new(screen.map(Path::to_path_buf));
    let mut input = DeferredSink::default();
    let lock = LockCoordinator::new(cli.lock_file, cli.socket, DaemonLauncher);

    let mut ctx = Context {
        store,
        registry: &registry,
        capture: &capture,
        input: &mut input,
        lock: &lock,
    };
    commands::execute(cli.command, &mut ctx).await
}

async fn dispatch(cli: Cli) -> Result<serde_json::Value, AxError> {
    match cli.snapshot.clone() {
        Some(path) => {
            let store = SnapshotStore::load(&path)
                .map_err(|e| AxError::invalid(format!("cannot load snapshot {}: {:#}", path.display(), e)))?;
            let screen = store.screen_image().map(Path::to_path_buf);
            run(&store, screen.as_deref(), cli).await
        }
        None => {
            tracing::debug!("no accessibility backend configured");
            run(&UnavailableStore, None, cli).await
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // stdout carries the JSON result only
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(AxError::invalid("").exit_code() as u8)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match dispatch(cli).await {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("failed to encode result: {}", e);
                ExitCode::from(AxError::action_failed("").exit_code() as u8)
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
