//! natprobe CLI
//!
//! Classifies the NAT between this host and the Internet using RFC 3489 STUN
//! probes.

mod config;
mod display;

use anyhow::Context;
use clap::{Parser, Subcommand};
use natprobe_discovery::{
    NatDetector, NoopObserver, ProbeObserver, ServerDescriptor, StunProber, survey_server_with,
};
use natprobe_transport::{SystemInterfaces, reserve_local_port};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::Config;
use display::{ProbeTable, print_classification, print_survey_summary};

/// natprobe - what kind of NAT am I behind?
#[derive(Parser)]
#[command(name = "natprobe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (default: <config dir>/natprobe/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the NAT type using two STUN servers
    Detect {
        /// Server A, host[:port]
        #[arg(long)]
        primary: Option<String>,

        /// Server B, host[:port]
        #[arg(long)]
        secondary: Option<String>,

        /// Response timeout per probe in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Use a fresh local port for every probe
        #[arg(long)]
        ephemeral: bool,
    },

    /// Check which CHANGE-REQUEST behaviours one server supports
    Check {
        /// Server to check, host[:port]
        #[arg(required = true)]
        server: String,
    },

    /// Check every configured candidate server
    Servers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    // Command-line overrides
    if let Commands::Detect {
        primary,
        secondary,
        timeout_ms,
        ephemeral,
    } = &cli.command
    {
        if let Some(primary) = primary {
            config.servers.primary.clone_from(primary);
        }
        if let Some(secondary) = secondary {
            config.servers.secondary.clone_from(secondary);
        }
        if let Some(timeout_ms) = timeout_ms {
            config.probe.timeout_ms = *timeout_ms;
        }
        if *ephemeral {
            config.probe.pin_local_port = false;
        }
    }

    // Validate configuration
    config.validate()?;

    // Initialize logging; RUST_LOG wins over both flag and file
    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Detect { .. } => detect(&config, cli.json).await?,
        Commands::Check { server } => {
            let server: ServerDescriptor = server
                .parse()
                .with_context(|| format!("'{server}' is not a valid host[:port]"))?;
            check_servers(&[server], &config, cli.json).await?;
        }
        Commands::Servers => {
            let servers = config.candidate_servers()?;
            if servers.is_empty() {
                anyhow::bail!("No candidate servers configured");
            }
            check_servers(&servers, &config, cli.json).await?;
        }
    }

    Ok(())
}

/// Run the classifier
async fn detect(config: &Config, json: bool) -> anyhow::Result<()> {
    let mut prober = StunProber::system().with_timeout(config.timeout());
    if config.probe.pin_local_port {
        let port = reserve_local_port().context("failed to reserve a local UDP port")?;
        tracing::debug!("Pinning local port {}", port);
        prober = prober.with_local_port(port);
    }

    let detector = NatDetector::new(
        prober,
        SystemInterfaces::new(),
        config.primary_server()?,
        config.secondary_server()?,
    )?
    .with_secondary_policy(config.classifier.secondary_failure);

    tracing::info!(
        "Classifying NAT via {} and {}",
        detector.primary(),
        detector.secondary()
    );

    let table = if json { None } else { Some(ProbeTable::start()) };
    let observer: &dyn ProbeObserver = match &table {
        Some(table) => table,
        None => &NoopObserver,
    };

    tokio::select! {
        classification = detector.classify_with(observer) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&classification)?);
            } else {
                print_classification(&classification);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            if let Some(table) = &table {
                table.finish();
            }
            eprintln!("Interrupted");
        }
    }

    Ok(())
}

/// Survey servers one after another
async fn check_servers(
    servers: &[ServerDescriptor],
    config: &Config,
    json: bool,
) -> anyhow::Result<()> {
    let prober = StunProber::system().with_timeout(config.timeout());
    let mut surveys = Vec::with_capacity(servers.len());

    for server in servers {
        let table = if json { None } else { Some(ProbeTable::start()) };
        let observer: &dyn ProbeObserver = match &table {
            Some(table) => table,
            None => &NoopObserver,
        };

        let survey = tokio::select! {
            survey = survey_server_with(&prober, server, observer) => survey,
            _ = tokio::signal::ctrl_c() => {
                if let Some(table) = &table {
                    table.finish();
                }
                eprintln!("Interrupted");
                break;
            }
        };

        if let Some(table) = &table {
            table.finish();
            print_survey_summary(&survey);
        }
        surveys.push(survey);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&surveys)?);
    }

    Ok(())
}
