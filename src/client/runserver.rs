use std::time::Duration;

use clap::Args;

use crate::views;

use super::SqliteConfig;

#[derive(Args, Debug)]
#[command(about, long_about = "Launch the server")]
pub struct RunserverArgs {
    #[arg(long, env = "FLORA_PORT", default_value_t = 8090)]
    pub(super) port: u16,
    #[arg(long, env = "FLORA_ADDRESS", default_value_t = String::from("0.0.0.0"))]
    pub(super) address: String,
    /// Origin allowed to perform cross-origin requests, any origin is allowed if unset
    #[arg(long, env = "FLORA_ALLOWED_ORIGIN")]
    pub(super) allowed_origin: Option<String>,
    /// The maximum size of a request body, in bytes
    #[arg(long, env = "FLORA_MAX_BODY_SIZE", default_value_t = views::DEFAULT_MAX_BODY_SIZE)]
    pub(super) max_body_size: usize,
    /// The timeout to use when performing the healthcheck, in milliseconds
    #[clap(long, env = "FLORA_HEALTH_CHECK_TIMEOUT_MS", default_value_t = 1000)]
    pub(super) health_check_timeout_ms: u64,
}

/// Create and run the server
pub async fn runserver(
    RunserverArgs {
        port,
        address,
        allowed_origin,
        max_body_size,
        health_check_timeout_ms,
    }: RunserverArgs,
    sqlite: SqliteConfig,
    app_version: Option<String>,
) -> anyhow::Result<()> {
    let config = views::ServerConfig {
        port,
        address,
        health_check_timeout: Duration::from_millis(health_check_timeout_ms),
        allowed_origin,
        max_body_size,
        sqlite_config: sqlite.into(),
        app_version,
    };

    let server = views::Server::new(config).await?;
    Ok(server.start().await?)
}
