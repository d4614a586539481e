mod client;
mod error;
mod views;

use std::process::exit;
use std::sync::Arc;

use clap::Parser;
use client::Client;
use client::Color;
use client::Commands;
use client::TelemetryConfig;
use client::healthcheck::healthcheck_cmd;
use client::print_openapi;
use client::runserver::runserver;
use colored::Colorize;
use common::tracing::NoopSpanExporter;
use common::tracing::Stream;
use common::tracing::Telemetry;
use common::tracing::TracingConfig;
use common::tracing::create_tracing_subscriber;
use database::DbConnectionPool;
use opentelemetry_otlp::WithExportConfig as _;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(_) => (),
        Err(e) => {
            if let Some(e) = e.downcast_ref::<error::InternalError>() {
                error!("{e}");
            } else {
                error!("{}: {e:#}", "Error".red().bold());
            }
            exit(2);
        }
    }
}

fn init_tracing(telemetry_config: TelemetryConfig, stream: Stream) -> anyhow::Result<()> {
    let telemetry = telemetry_config.telemetry();
    let exporter = telemetry
        .as_ref()
        .map(|Telemetry { endpoint, .. }| {
            opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.as_str())
                .build()
        })
        .transpose()?;
    let tracing_config = TracingConfig {
        stream,
        log_level: LevelFilter::INFO,
        telemetry,
        directives: telemetry_config.log_directives,
    };
    match exporter {
        Some(exporter) => create_tracing_subscriber(tracing_config, exporter).try_init()?,
        None => create_tracing_subscriber(tracing_config, NoopSpanExporter).try_init()?,
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let client = Client::parse();

    // The OpenAPI document is written to stdout, logs go to stderr
    let stream = match client.command {
        Commands::Openapi => Stream::Stderr,
        _ => Stream::Stdout,
    };
    init_tracing(client.telemetry_config, stream)?;

    match client.color {
        Color::Never => colored::control::set_override(false),
        Color::Always => colored::control::set_override(true),
        Color::Auto => colored::control::unset_override(),
    }

    match client.command {
        Commands::Runserver(args) => {
            runserver(*args, client.sqlite_config, client.app_version).await
        }
        Commands::Openapi => print_openapi(),
        Commands::Healthcheck => {
            let sqlite_config = client.sqlite_config;
            let db_pool = DbConnectionPool::try_initialize(
                sqlite_config.database_url,
                sqlite_config.database_pool_size,
            )
            .await?;
            healthcheck_cmd(Arc::new(db_pool)).await
        }
    }
}
