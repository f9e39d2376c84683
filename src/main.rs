//! Mandi price service - serves commodity prices from unreliable upstreams
//!
//! Runs the HTTP API by default, or a one-shot keyword search with
//! `mandi search <QUERY>`, optionally exported with `--export json|csv`.

use std::io;
use std::path::PathBuf;

use clap::Parser;
use chrono::Local;
use tracing::info;

use mandi::aggregate::Mode;
use mandi::api::{router, AppState};
use mandi::cli::{print_table, Cli, Command};
use mandi::config::AppConfig;
use mandi::export::{default_path, export_to_file, ExportFormat};
use mandi::filter::filter;
use mandi::refresh::RefreshHandle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `search` output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mandi=info,tower_http=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or_default() {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
                config.validate()?;
            }
            serve(config).await
        }
        Command::Search {
            query,
            export,
            output,
        } => search(config, &query, export, output).await,
    }
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::from_config(&config)?;
    let refresh = RefreshHandle::spawn(
        state.refresher(),
        state.aggregator().plan().to_vec(),
        config.refresh.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        sources = state.aggregator().plan().len(),
        "mandi price service listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    refresh.shutdown().await;
    Ok(())
}

async fn search(
    config: AppConfig,
    query: &str,
    export: Option<ExportFormat>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::from_config(&config)?;
    let aggregate = state.aggregator().collect(Mode::Blocking).await;

    for source in &aggregate.sources {
        info!(
            source = %source.key,
            provenance = %source.provenance,
            records = source.count,
            error = source.error.as_deref().unwrap_or(""),
            "resolved"
        );
    }

    let records = filter(aggregate.records, query);
    let title = format!("Matches for '{}'", query);
    print_table(&mut io::stdout().lock(), &title, &records)?;

    if let Some(format) = export {
        let path = output.unwrap_or_else(|| default_path(format, Local::now()));
        export_to_file(&records, format, &path)?;
        println!("Exported {} records to {}", records.len(), path.display());
    }
    Ok(())
}
