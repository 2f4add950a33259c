use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod client;
mod core;
mod daemon;

#[derive(Parser)]
#[command(name = "vehicle-poller")]
#[command(author, version, about = "Adaptive polling daemon for connected-vehicle telemetry")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the polling daemon
    Daemon,

    /// Fetch and show current vehicle status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Only show the vehicle with this VIN
        #[arg(long)]
        vin: Option<String>,

        /// Read the daemon's cached snapshot instead of fetching
        #[arg(long)]
        daemon: bool,
    },

    /// Trigger an immediate daemon poll via D-Bus
    Refresh,

    /// Request or release a faster poll interval via D-Bus
    Interval {
        #[command(subcommand)]
        action: IntervalAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum IntervalAction {
    /// Poll at most every SECONDS while KEY is set (default: polling.fast_interval)
    Set {
        key: String,
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        seconds: Option<u64>,
    },

    /// Release the request made under KEY
    Reset { key: String },
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Under systemd stderr already lands in the journal, so use one or the other.
    let journald = std::env::var_os("JOURNAL_STREAM").and_then(|_| tracing_journald::layer().ok());
    let fmt = journald
        .is_none()
        .then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(journald)
        .with(fmt)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon => {
            let debug = core::settings::Settings::load().is_ok_and(|s| s.debug);
            init_logging(debug);
            daemon::run().await
        }
        Commands::Status { json, vin, daemon } => {
            init_logging(false);
            cli::status::run(json, vin, daemon).await
        }
        Commands::Refresh => {
            init_logging(false);
            cli::refresh::run().await
        }
        Commands::Interval { action } => {
            init_logging(false);
            match action {
                IntervalAction::Set { key, seconds } => cli::interval::set(&key, seconds).await,
                IntervalAction::Reset { key } => cli::interval::reset(&key).await,
            }
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}
