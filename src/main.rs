//! pim-tui - terminal dashboard for Azure Privileged Identity Management
//!
//! Lists eligible Entra roles, PIM groups and Azure subscription roles and
//! activates or deactivates them in batches.

#![deny(clippy::all)]

mod app;
mod auth;
mod azure;
mod config;
mod error;
mod runtime;
mod settings;
mod tui;

use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use app::App;
use azure::{PimClient, RestGateway};
use config::Config;
use runtime::Runtime;
use tui::Theme;

fn main() -> ExitCode {
    // Load .env file (if present) before anything else
    if let Err(e) = dotenvy::dotenv() {
        // .env file is optional - only report if it exists but can't be read
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => match Config::defaults() {
            Ok(defaults) => (defaults, Some(e)),
            Err(fatal) => {
                eprintln!("Configuration error: {:#}", fatal);
                return ExitCode::from(1);
            }
        },
    };

    init_logging(&config.logging.level);
    info!("Starting pim-tui v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = config_error {
        warn!("Failed to load configuration, using defaults: {:#}", e);
        eprintln!("Warning: {:#}. Using default configuration.", e);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create Tokio runtime: {}", e);
            eprintln!("Failed to start: {}", e);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => {
            info!("Exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Write tracing output to the log file; the terminal belongs to the TUI.
///
/// `RUST_LOG` overrides the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_file = settings::init_log_directory().and_then(|dir| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(settings::LOG_FILE))
            .map_err(Into::into)
    });

    match log_file {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .with_thread_ids(false)
            .init(),
        Err(e) => {
            eprintln!("Warning: Could not open log file: {}", e);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::sink)
                .init();
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let credential = auth::credential_from_config(&config).context("Failed to set up credentials")?;
    let credential_name = credential.name();
    info!("Using {} credential", credential_name);

    let gateway = RestGateway::new(credential).context("Failed to create HTTP client")?;
    let client = Arc::new(PimClient::new(gateway));

    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let runtime = Runtime::new(
        client,
        tx.clone(),
        cancel.clone(),
        settings::export_directory(),
    );

    let app = App::new(&config, credential_name);
    let theme = Theme::from_config(&config.theme);

    tui::run(app, runtime, tx, rx, cancel, theme).await
}
