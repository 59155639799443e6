//! Doggie Lab - CAN ECU network emulator
//!
//! Runs the emulated car (central, cruise control, doors, immobilizer, ABS,
//! instrument cluster and the diagnostic VIN ECU) on a virtual bus or on
//! SocketCAN interfaces.
//!
//! # Usage
//!
//! In-process bus with the operator console on stdin:
//! ```bash
//! ./doggie-lab
//! ```
//!
//! Send on can0, receive on can1:
//! ```bash
//! ./doggie-lab --socketcan can0 can1
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use doggie_ecus::config::TransportKind;
use doggie_ecus::{Car, LabConfig};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod console;

#[derive(Parser, Debug)]
#[command(name = "doggie-lab")]
#[command(about = "CAN ECU network emulator for security training")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Use SocketCAN: transmit interface, then receive interface
    #[arg(long, num_args = 2, value_names = ["TX", "RX"])]
    socketcan: Option<Vec<String>>,

    /// Bus bitrate
    #[arg(long)]
    speed: Option<u32>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_console: bool,
}

fn init_tracing(args: &Args) {
    let default_filter = if args.verbose {
        "doggie_lab=debug,doggie_ecus=debug,doggie_core=debug"
    } else {
        "doggie_lab=info,doggie_ecus=info,doggie_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_config(args: &Args) -> Result<LabConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from: {}", path);
            LabConfig::load(path).with_context(|| format!("Failed to load config '{path}'"))?
        }
        None => LabConfig::default(),
    };

    if let Some([tx, rx]) = args.socketcan.as_deref() {
        config.transport.kind = TransportKind::Socketcan;
        config.transport.tx_interface = tx.clone();
        config.transport.rx_interface = rx.clone();
    }
    if let Some(speed) = args.speed {
        config.transport.bitrate = speed;
    }
    Ok(config)
}

async fn run_console(mut lines: mpsc::Receiver<String>, handles: doggie_ecus::CarHandles) {
    info!("{}", console::HELP);

    while let Some(line) = lines.recv().await {
        match console::parse(&line) {
            Ok(Some(console::ConsoleCommand::Help)) => info!("{}", console::HELP),
            Ok(Some(command)) => {
                if let Err(e) = console::dispatch(command, &handles) {
                    warn!(error = %e, "Command not delivered");
                }
            }
            Ok(None) => {}
            Err(e) => warn!("{}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let config = load_config(&args)?;
    info!(
        transport = ?config.transport.kind,
        tx = %config.transport.tx_interface,
        rx = %config.transport.rx_interface,
        bitrate = config.transport.bitrate,
        "Starting Doggie Lab"
    );

    let mut car = Car::builder(config).build()?;
    if let Err(e) = car.start().await {
        warn!(error = %e, "Some ECUs failed to start");
    }

    let console = if args.no_console {
        None
    } else {
        let lines = console::spawn_line_reader(std::io::BufReader::new(std::io::stdin()))
            .context("Failed to start console reader")?;
        Some(tokio::spawn(run_console(lines, car.handles().clone())))
    };

    info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    if let Some(console) = console {
        console.abort();
    }
    car.stop().await?;
    info!("Doggie Lab stopped");
    Ok(())
}
