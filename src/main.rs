use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tidewatch::alerts::{LogChannel, NotificationChannel, TelegramChannel};
use tidewatch::clock::SystemClock;
use tidewatch::collectors::http::{HttpTransport, ReqwestTransport};
use tidewatch::collectors::retry::RetryPolicy;
use tidewatch::config::Config;
use tidewatch::error::ConfigError;
use tidewatch::monitoring::Monitor;
use tokio::sync::watch;

/// Command-line arguments for the coastal risk monitor
#[derive(Parser)]
#[command(
    name = "tidewatch",
    about = "Coastal multi-source risk monitor",
    long_about = "Polls seismic, marine, weather, solar and lunar sources for the configured \
                  coastal region, combines them into a weighted risk score and sends \
                  deduplicated alerts when the risk level calls for it."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Run a single cycle and exit
    #[arg(long, help = "Run one acquisition and assessment cycle, then exit")]
    once: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// A missing config file is not an error here; loading falls back to
    /// defaults for it.
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if config_path.extension().is_some_and(|ext| ext != "toml") {
                    warn!(
                        "Configuration file does not have .toml extension: {}",
                        config_path.display()
                    );
                }
            }
        }

        Ok(())
    }
}

/// Load configuration, falling back to defaults when the file is absent
///
/// # Returns
///
/// The loaded configuration, or an error if the file exists but cannot be
/// read, decoded, parsed or validated
fn load_config(config_path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match config_path {
        Some(path) if !path.exists() => {
            warn!(
                "Configuration file '{}' not found, using defaults",
                path.display()
            );
            Config::default()
        }
        Some(path) => Config::from_file(path)?,
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    config.apply_env_overrides();
    Ok(config)
}

fn build_channel(config: &Config, transport: Arc<dyn HttpTransport>) -> Arc<dyn NotificationChannel> {
    match &config.alerts.telegram {
        Some(telegram) => {
            info!("Alerts will be sent to Telegram chat {}", telegram.chat_id);
            Arc::new(TelegramChannel::new(transport, telegram.clone()))
        }
        None => {
            warn!("No Telegram credentials configured, alerts will only be logged");
            Arc::new(LogChannel)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting tidewatch");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let policy = RetryPolicy::from(&config.retry);
    let transport: Arc<dyn HttpTransport> = Arc::new(
        ReqwestTransport::new(policy.request_timeout).context("Failed to build HTTP client")?,
    );
    let channel = build_channel(&config, transport.clone());
    let mut monitor = Monitor::from_config(&config, transport, Arc::new(SystemClock), channel);

    if cli.once {
        let report = monitor.run_cycle().await.context("Cycle failed")?;
        info!(
            "Single cycle finished: {} (score {:.2})",
            report.assessment.alert_level, report.assessment.combined_score
        );
        return Ok(());
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if stop_tx.send(true).is_err() {
            error!("Monitor already stopped");
        }
    })
    .context("Error setting SIGINT handler")?;

    info!("Monitoring is running. Press Ctrl+C to stop.");
    monitor.run(stop_rx).await;

    info!("Shutdown complete");
    Ok(())
}
