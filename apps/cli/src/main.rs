use std::path::PathBuf;

use anyhow::{Context, Result};
use bsl_core::session::{BslSession, SessionConfig};
use bsl_core::{parse_size, partition};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Spreadtrum BSL Download Tool (Pure Rust)", long_about = None)]
struct Args {
    /// TOML session configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to stage-1 loader (fdl1.bin)
    #[arg(long)]
    fdl1: Option<PathBuf>,

    /// Path to stage-2 loader (fdl2.bin)
    #[arg(long)]
    fdl2: Option<PathBuf>,

    /// Partition read window in bytes
    #[arg(long)]
    window: Option<u32>,

    /// Seconds to wait for the device to appear
    #[arg(long)]
    wait: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Load FDL1 and FDL2 so partitions can be accessed
    Ready,
    /// Reboot the device into normal mode
    Reset,
    /// Power the device off
    Shutdown,
    /// Read a partition into a file
    Read {
        partition: String,
        /// Bytes to read; accepts k/K and m/M suffixes
        size: String,
        file: PathBuf,
    },
    /// Write a file into a partition
    Write { partition: String, file: PathBuf },
    /// Copy 512-byte blocks of a partition into a file
    DumpBlocks {
        partition: String,
        start: u64,
        count: u32,
        file: PathBuf,
    },
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(path) = &args.fdl1 {
        config.fdl1_path = path.clone();
    }
    if let Some(path) = &args.fdl2 {
        config.fdl2_path = path.clone();
    }
    if let Some(window) = args.window {
        config.upload_window = window;
    }
    if let Some(wait) = args.wait {
        config.device_wait_secs = wait;
    }
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    // Validate arguments before touching the device.
    match &args.command {
        Cmd::Read { partition, size, .. } => {
            partition::lookup(partition)?;
            parse_size(size)?;
        }
        Cmd::Write { partition, .. } | Cmd::DumpBlocks { partition, .. } => {
            partition::lookup(partition)?;
        }
        _ => {}
    }

    let session = BslSession::open(config)?;

    match args.command {
        Cmd::Ready => {
            let report = session.ready()?;
            if report.incompatible_partition {
                warn!("FDL2 reports an incompatible partition table");
            }
            info!("ready: ok");
        }
        Cmd::Reset => {
            session.reset()?;
            info!("reset: ok");
        }
        Cmd::Shutdown => {
            session.shutdown()?;
            info!("shutdown: ok");
        }
        Cmd::Read {
            partition,
            size,
            file,
        } => {
            let summary = session.read_partition(&partition, parse_size(&size)?, &file)?;
            info!(bytes = summary.bytes, file = %file.display(), "read: ok");
        }
        Cmd::Write { partition, file } => {
            let summary = session.write_partition(&partition, &file)?;
            info!(bytes = summary.bytes, "write: ok");
        }
        Cmd::DumpBlocks {
            partition,
            start,
            count,
            file,
        } => {
            let bytes = session.dump_blocks(&partition, start, count, &file)?;
            info!(bytes, file = %file.display(), "dump-blocks: ok");
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting bsl (nusb backend)...");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
