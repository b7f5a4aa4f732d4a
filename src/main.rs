//! Warden worker daemon
//!
//! Registers the server instances already present under the base
//! directory, then serves line-delimited JSON commands on stdin.
//! Receipts and console events go to stdout, one JSON object per
//! line; logging goes to stderr so stdout stays a clean protocol
//! channel.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warden::control::{CommandRequest, ConsoleLine, ControlPlane};
use warden::{APP_NAME, APP_VERSION};

#[derive(Debug, Parser)]
#[command(name = "warden", version, about = "Supervise self-hosted game server instances")]
struct Args {
    /// Base directory holding servers/, backup/ and archive/
    #[arg(long)]
    basedir: Option<PathBuf>,

    /// Name this worker announces in its logs
    #[arg(long)]
    worker_name: Option<String>,
}

fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    let basedir = args.basedir.unwrap_or_else(default_basedir);
    let worker_name = args
        .worker_name
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| APP_NAME.to_string());

    info!("{} v{} starting up worker node: `{}`", APP_NAME, APP_VERSION, worker_name);
    info!("Scanning servers from base directory: {}", basedir.display());

    let (console_tx, console_rx) = mpsc::channel::<ConsoleLine>();
    let mut plane = ControlPlane::new(basedir, console_tx);
    let registered = plane.scan()?;
    info!("Registered {} existing server instance(s)", registered);

    // Console relay: every framed line from every instance becomes one
    // event object on stdout
    std::thread::spawn(move || {
        for line in console_rx {
            let event = serde_json::json!({
                "type": "console",
                "server_name": line.server_name,
                "msg": line.msg,
            });
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", event);
            let _ = out.flush();
        }
    });

    info!("Worker node set up and listening.");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<CommandRequest>(line) {
            Ok(request) => {
                info!(
                    "Received {} for server `{}`",
                    request.cmd, request.server_name
                );
                let receipt = plane.dispatch(&request);
                let mut out = std::io::stdout().lock();
                writeln!(out, "{}", serde_json::to_string(&receipt)?)?;
                out.flush()?;
            }
            Err(e) => warn!("Discarding malformed command: {}", e),
        }
    }

    info!("{} shutting down", APP_NAME);
    Ok(())
}

/// Initialize the logging system
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warden=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Default base directory when --basedir is not given
fn default_basedir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join(APP_NAME)
}
