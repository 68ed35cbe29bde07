use anyhow::{Context, Result};
use clap::Parser;
use mavtables_core::config::{AppConfig, LogFormat, LoggingConfig};
use mavtables_filter::FilterConfig;
use mavtables_pool::ConnectionPool;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// mavtables - firewall and router for MAVLink packets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MAVTABLES_CONFIG", default_value = "mavtables.yaml")]
    config: PathBuf,

    /// Load and validate the configuration, print the chains and exit
    #[arg(long)]
    check: bool,

    /// Print an example configuration and exit
    #[arg(long)]
    example: bool,

    /// Override the configured log level
    #[arg(short, long)]
    log_level: Option<String>,
}

/// Filter section of the configuration file. The rest is [`AppConfig`].
#[derive(Debug, Deserialize)]
struct FilterSection {
    #[serde(default)]
    filter: FilterConfig,
}

#[derive(Debug, Serialize)]
struct ExampleConfig {
    #[serde(flatten)]
    app: AppConfig,
    filter: FilterConfig,
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let level = logging.parse_level()?;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_file(logging.file_line)
        .with_line_number(logging.file_line);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

fn load_filter(path: &Path) -> Result<FilterConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let section: FilterSection =
        serde_yaml::from_str(&contents).context("Failed to parse filter section")?;
    section
        .filter
        .validate()
        .context("Invalid filter configuration")?;
    Ok(section.filter)
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    if args.example {
        let example = ExampleConfig {
            app: AppConfig::default(),
            filter: FilterConfig::example(),
        };
        print!(
            "{}",
            serde_yaml::to_string(&example).context("Failed to serialize example")?
        );
        return Ok(());
    }

    // Load configuration file, with MAVTABLES__* environment overrides
    let mut config = AppConfig::from_config_builder(&args.config)
        .with_context(|| format!("Failed to load config file: {:?}", args.config))?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate().context("Invalid configuration")?;

    init_logging(&config.logging)?;
    info!("Configuration loaded from {:?}", args.config);

    let filter_config = load_filter(&args.config)?;
    let filter = filter_config.into_filter()?;

    if args.check {
        println!("{}", filter.chains());
        info!("Configuration OK");
        return Ok(());
    }

    let pool = ConnectionPool::new();
    info!(
        chains = filter.chains().len(),
        default_chain = %filter.root(),
        accept_by_default = filter.accept_by_default(),
        queue_capacity = ?config.queue.capacity,
        address_timeout = ?config.address_pool.timeout(),
        "Filter ready"
    );
    debug!(stats = %pool.stats(), "Connection pool ready");

    // Transports attach connections to the pool; none are built in.
    info!(
        connections = pool.connection_count(),
        "No transports configured, exiting"
    );

    Ok(())
}
