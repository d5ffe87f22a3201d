use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epg_harvester::{
    config::Config,
    ingestor::{RefreshScheduler, RefreshStateManager, StateStore},
    models::RefreshTrigger,
    observability::tracing_sink,
    pipeline::RefreshOrchestrator,
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "epg-harvester")]
#[command(version)]
#[command(about = "Harvests TV listings on a schedule and serves a merged XMLTV guide")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Automatic refresh interval in hours (enables automatic refresh)
    #[arg(short = 'i', long, value_name = "HOURS", value_parser = clap::value_parser!(u64).range(1..))]
    refresh_interval: Option<u64>,

    /// Disable automatic refresh and only serve published files
    #[arg(long, conflicts_with = "refresh_interval")]
    no_refresh: bool,

    /// Trigger a refresh as soon as the server is up
    #[arg(long)]
    refresh_now: bool,

    /// Run a single refresh and exit
    #[arg(long)]
    once: bool,
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(host) = self.host.clone() {
            config.web.host = host;
        }
        if let Some(port) = self.port {
            config.web.port = port;
        }
        if let Some(hours) = self.refresh_interval {
            config.schedule.interval = Duration::from_secs(hours * 3600);
            config.schedule.enabled = true;
        }
        if self.no_refresh {
            config.schedule.enabled = false;
        }
        if self.refresh_now {
            config.schedule.refresh_on_startup = true;
        }
    }
}

fn init_logging(cli: &Cli) {
    let log_filter = if cli.log_level == "trace" {
        format!("epg_harvester={},tower_http=trace", cli.log_level)
    } else {
        format!("epg_harvester={}", cli.log_level)
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter.into());

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    info!("Starting EPG Harvester v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    cli.apply_overrides(&mut config);
    config.validate()?;

    if config.sources.is_empty() {
        warn!("No sources configured; refreshes will fail until [[sources]] are added");
    }

    let state = RefreshStateManager::load(StateStore::new(&config.schedule.state_file)).await;
    let orchestrator = Arc::new(RefreshOrchestrator::from_config(
        &config,
        state,
        tracing_sink(),
    )?);

    if cli.once {
        let record = orchestrator.run_refresh(RefreshTrigger::Cli).await;
        if record.success {
            info!("{}", record.message);
            return Ok(());
        }
        error!("Refresh failed: {}", record.message);
        std::process::exit(1);
    }

    let scheduler = Arc::new(RefreshScheduler::new(orchestrator, &config.schedule));
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    let server_handle = if config.web.enabled {
        let web_server = WebServer::new(&config, AppState::new(config.clone(), scheduler.clone()))?;
        info!(
            "Starting web server on {}:{}",
            web_server.host(),
            web_server.port()
        );

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = web_server.serve_with_cancellation(ready_tx, token).await {
                error!("Web server failed: {}", e);
            }
        });

        match ready_rx.await {
            Ok(Ok(())) => info!("Web server is now listening"),
            Ok(Err(bind_error)) => return Err(bind_error),
            Err(_) => return Err(anyhow::anyhow!("Web server failed to start")),
        }
        Some(handle)
    } else {
        info!("Web server disabled");
        None
    };

    scheduler.start().await;
    if config.schedule.refresh_on_startup {
        scheduler.trigger(RefreshTrigger::Startup).await;
    }

    info!("All services started successfully");

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down gracefully");

    scheduler.stop().await;
    shutdown.cancel();
    if let Some(handle) = server_handle {
        handle.await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_overrides() {
        let cli = Cli::try_parse_from(["epg-harvester", "-i", "6", "--refresh-now", "-p", "8080"]).unwrap();
        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert!(config.schedule.enabled);
        assert_eq!(config.schedule.interval, Duration::from_secs(6 * 3600));
        assert!(config.schedule.refresh_on_startup);
        assert_eq!(config.web.port, 8080);
    }

    #[test]
    fn test_no_refresh_disables_schedule() {
        let cli = Cli::try_parse_from(["epg-harvester", "--no-refresh"]).unwrap();
        let mut config = Config::default();
        config.schedule.enabled = true;
        cli.apply_overrides(&mut config);

        assert!(!config.schedule.enabled);
        assert!(!config.schedule.refresh_on_startup);
        assert_eq!(config.schedule.interval, Config::default().schedule.interval);
    }

    #[test]
    fn test_rejects_conflicting_or_zero_interval() {
        assert!(Cli::try_parse_from(["epg-harvester", "-i", "0"]).is_err());
        assert!(Cli::try_parse_from(["epg-harvester", "-i", "6", "--no-refresh"]).is_err());
    }
}
