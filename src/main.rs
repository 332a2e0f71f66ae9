use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rpa_gateway::gateway::build_registry;
use rpa_gateway::{Config, Gateway};

/// RPA Gateway - task dispatch for a fleet of Android chat-automation devices
#[derive(Parser)]
#[command(name = "rpa-gateway", version, about)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "RPA_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List configured devices
    Devices,
    /// Query one device's automation status
    Status {
        /// Device id
        device_id: String,
    },
    /// Print a device's current control tree (for id calibration)
    DumpUi {
        /// Device id
        device_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,rpa_gateway=info",
        1 => "info,rpa_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Devices => cmd_devices(&config).await,
            Command::Status { device_id } => cmd_status(&config, &device_id).await,
            Command::DumpUi { device_id } => cmd_dump_ui(&config, &device_id).await,
        };
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        devices = config.devices.len(),
        "starting rpa gateway"
    );

    let gateway = Gateway::new(config).await?;
    gateway.run().await?;

    Ok(())
}

/// Print configured devices
async fn cmd_devices(config: &Config) -> anyhow::Result<()> {
    let registry = build_registry(config).await?;
    let devices = registry.list_all().await;

    if devices.is_empty() {
        println!("No devices configured.");
        return Ok(());
    }

    for device in devices {
        let app = device.target_app.as_deref().unwrap_or("-");
        println!(
            "{:<16} {:<20} {:<32} app={app}",
            device.id, device.display_name, device.endpoint_address
        );
    }

    Ok(())
}

/// Query one device and print its status as JSON
async fn cmd_status(config: &Config, device_id: &str) -> anyhow::Result<()> {
    let registry = build_registry(config).await?;
    let status = registry.status(device_id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Print a device's control tree
async fn cmd_dump_ui(config: &Config, device_id: &str) -> anyhow::Result<()> {
    let registry = build_registry(config).await?;
    let result = registry.resolve(device_id).await?.dump_ui().await;

    if !result.success {
        anyhow::bail!("dump_ui failed: {}", result.message);
    }

    match result.data {
        serde_json::Value::String(tree) => println!("{tree}"),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}
