//! CLI entry point for melcloud.
//!
//! Logs in with the supplied credentials, runs one read query and writes
//! the raw JSON body to stdout.
//!
//! Exit codes:
//! - 0: success
//! - 1: runtime error (login failure, network error, non-2xx status)
//! - 2: argument validation error (clap handles this automatically)

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

use melcloud::auth::Credentials;
use melcloud::client::{MelCloudClient, ResponseBody};
use melcloud::config::ClientConfig;
use melcloud::devices::{get_device, list_devices};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// MELCloud account email.
    #[arg(long, env = "MELCLOUD_EMAIL")]
    email: String,

    /// MELCloud account password. Prefer the MELCLOUD_PASSWORD environment
    /// variable to keep it out of shell history.
    #[arg(long, env = "MELCLOUD_PASSWORD", hide_env_values = true)]
    password: String,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG wins when set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the device list.
    Devices,
    /// Print the state of one device.
    Device {
        /// Device ID.
        #[arg(long)]
        id: String,
        /// Building ID the device belongs to.
        #[arg(long)]
        building_id: String,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "melcloud=warn",
        1 => "melcloud=debug",
        _ => "melcloud=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn write_body(body: ResponseBody) -> Result<(), Box<dyn std::error::Error>> {
    let status = body.status();
    let bytes = body.bytes().await?;

    if !status.is_success() {
        return Err(format!(
            "MELCloud returned {status}: {}",
            String::from_utf8_lossy(&bytes)
        )
        .into());
    }

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&bytes).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

async fn run(args: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::default().with_timeout(Duration::from_secs(args.timeout));
    let credentials = Credentials::new(args.email, args.password);
    let client = MelCloudClient::authenticate_with_config(credentials, config).await?;

    let body = match &args.command {
        Command::Devices => list_devices(&client).await?,
        Command::Device { id, building_id } => get_device(&client, id, building_id).await?,
    };

    write_body(body).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
