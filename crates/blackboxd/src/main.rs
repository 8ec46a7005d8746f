//! blackboxd: the Blackbox daemon.
//!
//! Single binary that assembles the fleet subsystems:
//! - Fleet configuration (file + `.env` + environment)
//! - Docker runtime gateway
//! - GPU inventory and telemetry sampler
//! - Deploy orchestrator and optimizer
//! - REST API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! blackboxd serve --port 6767 --config blackbox.toml
//! ```

mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blackboxd", about = "Blackbox GPU fleet daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the fleet API.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "6767")]
        port: u16,

        /// Optional TOML config file. Environment variables override it.
        #[arg(long)]
        config: Option<PathBuf>,

        /// GPU sampling interval in seconds.
        #[arg(long, default_value = "5")]
        sample_interval: u64,

        /// Disable the nvidia-smi sampler (telemetry then arrives only via the API).
        #[arg(long)]
        no_sampler: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve {
            port,
            config,
            sample_interval,
            no_sampler,
        } => {
            serve::run(serve::ServeOptions {
                port,
                config,
                sample_interval,
                sampler: !no_sampler,
            })
            .await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blackboxd=debug,blackbox=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
