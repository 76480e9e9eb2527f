use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epg_merger::{config::Config, ingestor::SchedulerService, services::GuideService, web::WebServer};

#[derive(Parser)]
#[command(name = "epg-merger")]
#[command(version)]
#[command(about = "Merges IPTV guide feeds into one XMLTV guide and playlist for the channels you have")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Cache directory (overrides config file)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Download the playlist and all guide feeds, then exit
    Update,
    /// Reconcile the cached documents and render the outputs, then exit
    Filter {
        /// host[:port] written into the guide DOCTYPE
        #[arg(long, value_name = "HOST")]
        public_host: Option<String>,
    },
    /// Update followed by filter
    Refresh {
        #[arg(long, value_name = "HOST")]
        public_host: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with specified level
    let log_filter = if cli.log_level == "trace" {
        format!("epg_merger={},tower_http=trace", cli.log_level)
    } else {
        format!("epg_merger={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting EPG merger v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config.display());

    // Override config with CLI arguments and environment
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(cache_dir) = cli.cache_dir {
        config.storage.cache_dir = cache_dir;
    }
    config.apply_env_overrides();

    let service = GuideService::new(config.clone()).context("Failed to start guide service")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, service).await,
        Command::Update => {
            let report = service.update().await?;
            info!("Update complete: {}", serde_json::to_string(&report)?);
            Ok(())
        }
        Command::Filter { public_host } => {
            let report = service.filter(public_host).await?;
            info!("Filter complete: {} entries written", report.entries_written);
            Ok(())
        }
        Command::Refresh { public_host } => {
            let report = service.refresh(public_host).await?;
            info!("Refresh complete: {} entries written", report.entries_written);
            Ok(())
        }
    }
}

async fn serve(config: Config, service: GuideService) -> Result<()> {
    if config.ingestion.run_on_startup {
        let startup = service.clone();
        tokio::spawn(async move {
            if let Err(e) = startup.refresh(None).await {
                error!("Startup refresh failed: {}", e);
            }
        });
    }

    if let Some(schedule) = config.update_schedule()? {
        let scheduler = SchedulerService::new(service.clone(), schedule);
        tokio::spawn(async move {
            if let Err(e) = scheduler.start().await {
                error!("Scheduler service failed: {}", e);
            }
        });
    }

    let web_server = WebServer::new(&config, service)?;
    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );
    web_server.serve().await?;

    Ok(())
}
