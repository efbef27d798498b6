// External crates
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

// Local modules
use btc_price_forecaster::api::{self, AppState};
use btc_price_forecaster::build_info;
use btc_price_forecaster::config::AppConfig;
use btc_price_forecaster::logging::setup_logger;
use btc_price_forecaster::service::{PredictionService, Timeframe};

#[derive(Debug, Parser)]
#[command(name = "btc-price-forecaster", version, about = "Bitcoin price forecasting service")]
struct Cli {
    /// Optional TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Train a model once and write the artifact
    Train {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Predict with the saved artifact and print JSON
    Predict {
        #[arg(long, default_value = "24h")]
        timeframe: Timeframe,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    setup_logger(&config.logging.level, cli.verbose);
    info!("Starting {}", build_info::describe());

    let service = Arc::new(PredictionService::from_config(&config)?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(service, &config).await,
        Command::Train { days } => {
            let summary = service.train(days).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Predict { timeframe } => {
            if !service.load_existing_model()? {
                bail!(
                    "no model artifact at {}, run `train` first",
                    config.model.path.display()
                );
            }
            let prediction = service.predict(timeframe).await?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
            Ok(())
        }
    }
}

async fn serve(service: Arc<PredictionService>, config: &AppConfig) -> Result<()> {
    match service.load_existing_model() {
        Ok(true) => info!("Loaded model from {}", config.model.path.display()),
        Ok(false) => {}
        Err(e) => warn!("Starting without a model: {}", e),
    }

    let state = AppState::new(service, config);
    let app = api::router(state, &config.server.cors_allowed_origins);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested");
}
