//! CLI Entry Point for fbgs_daq
//!
//! Record a session from an interrogator:
//! ```bash
//! fbgs_daq record --host 192.168.1.11 --duration 6 --frequency 100
//! ```
//!
//! Serve synthetic frames for bench testing:
//! ```bash
//! fbgs_daq simulate --port 5001 --schema shape-sensing
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fbgs_daq::acquisition::{AcquisitionControl, AcquisitionLoop, AcquisitionState};
use fbgs_daq::config::{FbgsConfig, DEFAULT_CONFIG_PATH};
use fbgs_daq::core::Schema;
use fbgs_daq::data::{export, save_recording};
use fbgs_daq::logging;
use fbgs_daq::protocol::FrameReader;
use fbgs_daq::simulator::Simulator;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fbgs_daq")]
#[command(about = "FBGS interrogator acquisition and shape reconstruction", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaArg {
    ShapeSensing,
    MulticoreFiber,
}

impl From<SchemaArg> for Schema {
    fn from(arg: SchemaArg) -> Self {
        match arg {
            SchemaArg::ShapeSensing => Schema::ShapeSensing,
            SchemaArg::MulticoreFiber => Schema::MulticoreFiber,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record one session and save it as YAML + CSV
    Record {
        /// Interrogator host
        #[arg(long)]
        host: Option<String>,
        /// Interrogator port (defaults to the schema's port)
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, value_enum)]
        schema: Option<SchemaArg>,
        /// Recording time in seconds
        #[arg(long)]
        duration: Option<f64>,
        /// Acquisition frequency in Hz
        #[arg(long)]
        frequency: Option<f64>,
        /// Seconds to count down before recording starts
        #[arg(long)]
        countdown: Option<u64>,
        /// Output directory
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Serve synthetic frames until Ctrl-C
    Simulate {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, value_enum)]
        schema: Option<SchemaArg>,
        /// Frame rate in Hz
        #[arg(long)]
        frequency: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = FbgsConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    match cli.command {
        Commands::Record {
            host,
            port,
            schema,
            duration,
            frequency,
            countdown,
            output,
        } => {
            if let Some(host) = host {
                config.connection.host = host;
            }
            if port.is_some() {
                config.connection.port = port;
            }
            if let Some(schema) = schema {
                config.connection.schema = schema.into();
            }
            if let Some(duration) = duration {
                config.acquisition.recording_time_s = duration;
            }
            if let Some(frequency) = frequency {
                config.acquisition.frequency_hz = frequency;
            }
            if let Some(countdown) = countdown {
                config.acquisition.countdown_s = countdown;
            }
            if let Some(output) = output {
                config.storage.output_dir = output;
            }
            config.validate()?;
            logging::init_from_config(&config)?;
            record(&config).await
        }
        Commands::Simulate {
            port,
            schema,
            frequency,
        } => {
            if let Some(schema) = schema {
                config.connection.schema = schema.into();
            }
            if port.is_some() {
                config.connection.port = port;
            }
            if let Some(frequency) = frequency {
                config.acquisition.frequency_hz = frequency;
            }
            config.validate()?;
            logging::init_from_config(&config)?;
            simulate(&config).await
        }
    }
}

async fn record(config: &FbgsConfig) -> Result<()> {
    let decoder = config.decoder().context("Failed to prepare decoder")?;
    let reader = FrameReader::connect(&config.connection.host, config.port(), config.connect_timeout())
        .await?
        .with_max_frame_len(config.connection.max_frame_len);

    let (control, ctx) = AcquisitionControl::new();
    let history = config.history()?;
    let capacity = history.capacity();
    let handle = AcquisitionLoop::new(reader, decoder, history, config.acquisition.frequency_hz)
        .with_polling(config.polling())
        .spawn(ctx);

    let interrupt = {
        let control = control.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, stopping acquisition");
                control.stop();
            }
        })
    };

    handle.wait_for_state(AcquisitionState::Armed).await;
    for remaining in (1..=config.acquisition.countdown_s).rev() {
        if control.is_stop_requested() || handle.is_finished() {
            break;
        }
        info!(remaining_s = remaining, "Starting recording");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    control.start_recording();
    info!(
        seconds = config.acquisition.recording_time_s,
        samples = capacity,
        "Recording"
    );

    let recording = handle.join().await.context("Acquisition failed")?;
    interrupt.abort();

    let (header, matrix) = export(&recording).context("Failed to export recording")?;
    let saved = save_recording(
        &config.storage.output_dir,
        &config.storage.file_stem,
        &config.storage.notes,
        &header,
        &matrix,
    )?;
    info!(
        samples = recording.samples.len(),
        reason = ?recording.stop_reason,
        yaml = %saved.yaml.display(),
        "Finished"
    );
    Ok(())
}

async fn simulate(config: &FbgsConfig) -> Result<()> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port());
    let mut simulator = Simulator::bind(addr, config.connection.schema, config.acquisition.frequency_hz).await?;
    if config.connection.schema == Schema::MulticoreFiber {
        simulator = simulator.with_core_radius(config.core_radius()?);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down simulator");
            shutdown_tx.send_replace(true);
        }
    });

    simulator.serve(shutdown_rx).await?;
    Ok(())
}
