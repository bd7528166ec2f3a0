mod config;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

use emukit::{Emulator, EmulatorRegistry, Session, ShutdownOptions, telemetry};
use emukit_artifact::ArtifactStore;
use emulator_suite::build_suite;

use config::{AppConfig, AppConfigProvider};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Cumulus local development harness - emulator suite orchestrator
#[derive(Parser)]
#[command(name = "cumulus-dev")]
#[command(about = "Cumulus local development harness - emulator suite orchestrator")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Artifact cache directory (overrides config)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Bind host for all emulators (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Print effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the configured emulators and run until interrupted
    Start,
    /// Validate configuration and print the session plan
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(ref path) = cli.config {
        if !Path::new(path).is_file() {
            anyhow::bail!("config file does not exist: {}", path.display());
        }
    }

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (CUMULUS__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(cli.cache_dir.as_deref(), cli.host.as_deref());

    telemetry::init_logging(&config.logging, cli.verbose);
    tracing::info!("Cumulus local development harness starting");

    if cli.print_config {
        println!("Effective configuration:\n{}", config.to_json_pretty()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => start_suite(config).await,
        Commands::Check => check_config(&config),
    }
}

/// Validate configuration and assemble the dependency-ordered registry.
fn build_registry(config: &AppConfig) -> Result<EmulatorRegistry<emulator_suite::SuiteEmulator>> {
    let settings = config.suite_settings();
    let provider = AppConfigProvider::new(config.clone());

    let emulators = build_suite(&provider, &settings)?;
    if emulators.is_empty() {
        anyhow::bail!(
            "no emulators configured; add sections under 'emulators' (database, firestore, functions, hosting)"
        );
    }

    Ok(EmulatorRegistry::build(emulators)?)
}

async fn start_suite(config: AppConfig) -> Result<()> {
    let registry = build_registry(&config)?;
    let session = Session::with_options(registry, config.timeouts(), ArtifactStore::new());

    let report = session.run(ShutdownOptions::Signals).await?;
    if report.is_clean() {
        tracing::info!("emulator suite shut down cleanly");
    } else {
        tracing::warn!(%report, "emulator suite shut down with errors");
    }
    Ok(())
}

fn check_config(config: &AppConfig) -> Result<()> {
    let registry = build_registry(config)?;

    println!("Configuration is valid");
    for (i, layer) in registry.layers().iter().enumerate() {
        let kinds: Vec<&str> = layer
            .iter()
            .map(|&idx| registry.entries()[idx].kind().as_str())
            .collect();
        println!("start group {}: {}", i + 1, kinds.join(", "));
    }
    Ok(())
}
