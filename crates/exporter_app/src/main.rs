//! Batch export binary: log in once, run every configured export spec in
//! order, republish each artifact to its spreadsheet tab.

mod config;
mod logging;
mod sheets;

use std::path::Path;

use export_logging::{export_error, export_info, export_warn};
use exporter_engine::{
    login, run_batch, ArtifactCache, BrowserSettings, CdpScope, CdpSession, DriverError,
    ExportError, PollSettings, SinkError,
};
use thiserror::Error;

use crate::config::{AppConfig, ConfigError};
use crate::sheets::SheetsSink;

/// Conditions that abort the whole run, as opposed to per-spec failures the
/// batch loop absorbs.
#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("browser: {0}")]
    Driver(#[from] DriverError),
    #[error("login: {0}")]
    Login(#[from] ExportError),
    #[error("spreadsheet access: {0}")]
    Sink(#[from] SinkError),
}

fn main() {
    logging::initialize();
    // A .env file is a convenience for local runs; deploys set real env vars.
    let _ = dotenvy::dotenv();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let config = match AppConfig::from_env(Path::new(&config_path)) {
        Ok(config) => config,
        Err(err) => {
            export_error!("{err}");
            std::process::exit(2);
        }
    };
    if config.specs.is_empty() {
        export_warn!("no exports configured in {config_path}; nothing to do");
        return;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            export_error!("could not start async runtime: {err}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(&config)) {
        Ok(0) => export_info!("run finished cleanly"),
        Ok(failed) => export_warn!("run finished with {failed} failed export(s); see the log"),
        Err(err) => {
            export_error!("run aborted: {err}");
            std::process::exit(1);
        }
    }
}

async fn run(config: &AppConfig) -> Result<usize, AppError> {
    let sink = SheetsSink::new(&config.sheet_id, &config.service_account_path)?;

    let session = CdpSession::launch(BrowserSettings {
        headless: config.headless,
        ..BrowserSettings::default()
    })
    .await?;
    let scope = session.page_scope();

    let outcome = drive(&scope, config, &sink).await;
    session.close().await;
    outcome
}

async fn drive(
    scope: &CdpScope,
    config: &AppConfig,
    sink: &SheetsSink,
) -> Result<usize, AppError> {
    login(scope, config.login_url.as_str(), &config.credentials).await?;

    let mut cache = ArtifactCache::load(&config.cache_path);
    let reports = run_batch(
        scope,
        &config.specs,
        &mut cache,
        sink,
        &PollSettings::default(),
    )
    .await;

    Ok(reports.iter().filter(|r| r.outcome.is_err()).count())
}
