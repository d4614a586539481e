pub mod healthcheck;
pub mod runserver;
mod sqlite_config;
mod telemetry_config;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use runserver::RunserverArgs;
pub use sqlite_config::SqliteConfig;
pub use telemetry_config::TelemetryConfig;

use crate::views::OpenApiRoot;

#[derive(Parser, Debug)]
#[command(author, version)]
pub struct Client {
    #[command(flatten)]
    pub sqlite_config: SqliteConfig,
    #[command(flatten)]
    pub telemetry_config: TelemetryConfig,
    #[arg(long, env, value_enum, default_value_t = Color::Auto)]
    pub color: Color,
    /// Flora version, reported by the `/version` endpoint
    #[clap(long, env = "FLORA_GIT_DESCRIBE")]
    pub app_version: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Debug, Default, Clone)]
pub enum Color {
    Never,
    Always,
    #[default]
    Auto,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Runserver(Box<RunserverArgs>), // suppresses clippy lint about variant size
    #[command(about, long_about = "Prints the OpenApi of the service")]
    Openapi,
    #[command(about, long_about = "Healthcheck")]
    Healthcheck,
}

/// Prints the OpenApi to stdout
pub fn print_openapi() -> anyhow::Result<()> {
    let openapi = OpenApiRoot::build_openapi();
    print!("{}", serde_yaml::to_string(&openapi)?);
    Ok(())
}
