//! beacond - Beacon alert overlay daemon
//!
//! Keeps the local alert overlay in sync with Alertmanager and persists
//! acknowledgements across restarts.

use std::path::{Path, PathBuf};

use beacon_store::ACKNOWLEDGED_BY_ANNOTATION;
use beacond::{
    inspect_snapshot, shutdown_signal, BeaconConfig, ConfigOverrides, Daemon,
    DEFAULT_CONFIG_PATH, DEFAULT_PERSISTENCE_PATH,
};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "beacond")]
#[command(about = "Beacon alert overlay daemon")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "BEACON_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Alertmanager base URL
    #[arg(long, env = "BEACON_ALERTMANAGER_URL", global = true)]
    alertmanager_url: Option<String>,

    /// Snapshot file; enables persistence
    #[arg(long, env = "BEACON_PERSISTENCE_FILE", global = true)]
    persistence_file: Option<PathBuf>,

    /// Reconciliation period in seconds
    #[arg(long, global = true)]
    recheck_interval: Option<u64>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default)
    Run,

    /// Print the alerts stored in a snapshot file
    Inspect {
        /// Snapshot file
        snapshot: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Write a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_format)?;

    match &cli.command {
        None | Some(Commands::Run) => run(&cli).await?,
        Some(Commands::Inspect { snapshot, json }) => inspect(snapshot, *json)?,
        Some(Commands::InitConfig { output, force }) => init_config(output, *force)?,
    }

    Ok(())
}

fn init_tracing(debug: bool, format: LogFormat) -> anyhow::Result<()> {
    let level = if debug { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in ["beacond", "beacon_store", "beacon_alertmanager"] {
        filter = filter.add_directive(format!("{target}={level}").parse()?);
    }

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<BeaconConfig> {
    let mut config = BeaconConfig::discover(cli.config.as_deref())?;
    config.apply_overrides(&ConfigOverrides {
        alertmanager_url: cli.alertmanager_url.clone(),
        persistence_file: cli.persistence_file.clone(),
        recheck_interval_secs: cli.recheck_interval,
    });
    config.validate()?;
    Ok(config)
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    info!(
        alertmanager = %config.alertmanager.url,
        persistence = ?config.store.persistence_path,
        "starting beacond"
    );

    let daemon = Daemon::new(&config)?;
    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));
    daemon.run(token).await;
    Ok(())
}

fn inspect(snapshot: &Path, json: bool) -> anyhow::Result<()> {
    let alerts = inspect_snapshot(snapshot)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
        return Ok(());
    }

    if alerts.is_empty() {
        println!("No alerts in {}", snapshot.display());
        return Ok(());
    }

    println!("{} alert(s) in {}:", alerts.len(), snapshot.display());
    println!();
    for alert in &alerts {
        println!("  {} {}", alert.fingerprint, alert.name());
        println!("    Starts: {}", alert.starts_at);
        println!("    Ends:   {}", alert.ends_at);
        if let Some(by) = alert.annotations.get(ACKNOWLEDGED_BY_ANNOTATION) {
            println!("    Acknowledged by: {by}");
        }
        println!();
    }

    Ok(())
}

fn init_config(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite",
            output.display()
        );
    }

    let mut config = BeaconConfig::default();
    config.store.persistence_path = Some(PathBuf::from(DEFAULT_PERSISTENCE_PATH));
    config.save(output)?;

    println!("Config written to {}", output.display());
    println!();
    println!("Set the Alertmanager URL, then run:");
    println!("  beacond run --config {}", output.display());

    Ok(())
}
