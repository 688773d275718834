use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use filecfg::{
    open_file_config, resolve_file_config, AnyFileConfig, Manifest, Settings, SettingsManager,
    SshConfig,
};

#[derive(Debug, Parser)]
#[command(name = "filecfg", version, about = "Resolve and read file references")]
struct Cli {
    /// Write logs to a timestamped file in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Settings file to use instead of the default location
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve references to local paths
    Resolve {
        #[arg(required = true)]
        references: Vec<String>,
    },
    /// Write the content of a reference to stdout
    Cat { reference: String },
    /// Show the connection parameters for a host in an SSH config file
    SshHost {
        host: String,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Resolve the entries of a manifest file
    Manifest { file: PathBuf, name: Option<String> },
    /// Print the effective settings
    Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_dir.as_deref())?;

    let manager = match &cli.settings {
        Some(path) => SettingsManager::with_path(path),
        None => SettingsManager::new()?,
    };
    let settings = manager
        .load()
        .with_context(|| format!("Failed to load settings from {:?}", manager.path()))?;
    debug!("Using settings from {:?}", manager.path());
    if Settings::install(settings).is_err() {
        bail!("Settings were already initialized");
    }

    match cli.command {
        Commands::Resolve { references } => resolve_all(references).await,
        Commands::Cat { reference } => {
            tokio::task::spawn_blocking(move || cat(&reference)).await?
        }
        Commands::SshHost { host, config } => {
            let ssh = SshConfig::from_ssh_config(&host, config.as_deref())
                .with_context(|| format!("Failed to look up host '{}'", host))?;
            print!("{}", toml::to_string_pretty(&ssh)?);
            Ok(())
        }
        Commands::Manifest { file, name } => {
            tokio::task::spawn_blocking(move || resolve_manifest(&file, name.as_deref())).await?
        }
        Commands::Settings => {
            print!("{}", toml::to_string_pretty(Settings::global())?);
            Ok(())
        }
    }
}

fn init_logging(log_dir: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("filecfg=info"));

    match log_dir {
        Some(log_dir) => {
            if !log_dir.exists() {
                std::fs::create_dir_all(log_dir)?;
            }
            let log_file = log_dir.join(format!(
                "filecfg_{}.log",
                Local::now().format("%Y%m%d_%H%M%S")
            ));
            let file = File::create(&log_file)
                .with_context(|| format!("Failed to create log file {:?}", log_file))?;

            fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(file)
                .init();
        }
        None => {
            fmt().with_env_filter(filter).with_writer(io::stderr).init();
        }
    }
    Ok(())
}

/// Resolves every reference on the blocking pool and prints the results in
/// the order given.
async fn resolve_all(references: Vec<String>) -> Result<()> {
    let mut tasks = JoinSet::new();
    for (index, reference) in references.into_iter().enumerate() {
        tasks.spawn_blocking(move || {
            let result = reference
                .parse::<AnyFileConfig>()
                .and_then(|config| resolve_file_config(&config));
            (index, reference, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(index, _, _)| *index);

    let mut failures = 0;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (_, reference, result) in results {
        match result {
            Ok(path) => writeln!(out, "{}", path.display())?,
            Err(e) => {
                failures += 1;
                tracing::error!("Failed to resolve {}: {}", reference, e);
                eprintln!("{}: {}", reference, e);
            }
        }
    }

    if failures > 0 {
        bail!("{} reference(s) could not be resolved", failures);
    }
    Ok(())
}

fn cat(reference: &str) -> Result<()> {
    let config: AnyFileConfig = reference.parse()?;
    let mut reader = open_file_config(&config)
        .with_context(|| format!("Failed to open {}", reference))?;
    let stdout = io::stdout();
    io::copy(&mut reader, &mut stdout.lock())
        .with_context(|| format!("Failed to read {}", reference))?;
    Ok(())
}

fn resolve_manifest(file: &Path, name: Option<&str>) -> Result<()> {
    let manifest = Manifest::load(file)
        .with_context(|| format!("Failed to load manifest {:?}", file))?;

    if let Some(name) = name {
        println!("{}", manifest.resolve(name)?.display());
        return Ok(());
    }

    let mut failures = 0;
    for (name, result) in manifest.resolve_all() {
        match result {
            Ok(path) => println!("{} = {}", name, path.display()),
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", name, e);
            }
        }
    }
    if failures > 0 {
        bail!("{} manifest entries could not be resolved", failures);
    }
    Ok(())
}
