mod openapi;
pub mod plants;

#[cfg(test)]
mod test_app;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::ServiceExt;
use axum::extract::DefaultBodyLimit;
use axum::extract::FromRef;
use axum::extract::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::HeaderValue;
use axum::routing::get;
use axum_tracing_opentelemetry::middleware::OtelAxumLayer;
use common::Version;
use database::DbConnectionPool;
use database::db_connection_pool::PingError;
use database::db_connection_pool::ping_database;
use thiserror::Error;
use tokio::time::timeout;
use tower::Layer as _;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::NormalizePath;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument as _;
use tracing::info;

pub use openapi::OpenApiRoot;

use crate::error::FloraError;
use crate::error::Result;

/// Default maximum size of a request body: 250MiB
pub const DEFAULT_MAX_BODY_SIZE: usize = 250 * 1024 * 1024;

fn service_router() -> Router<AppState> {
    // Paths ordered by number of segments
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/api/plants", get(plants::list).post(plants::create))
        .route(
            "/api/plants/{plant_id}",
            get(plants::get).put(plants::update).delete(plants::delete),
        )
}

#[derive(Debug, Error)]
pub enum AppHealthError {
    #[error("Timeout error")]
    Timeout,
    #[error(transparent)]
    Database(#[from] PingError),
}

impl FloraError for AppHealthError {
    fn get_status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn get_type(&self) -> &str {
        match self {
            Self::Timeout => "flora:app_health:Timeout",
            Self::Database(_) => "flora:app_health:Database",
        }
    }
}

#[utoipa::path(
    get, path = "/health",
    responses(
        (status = 200, description = "Check if Flora is running correctly", body = String)
    )
)]
async fn health(
    State(AppState {
        db_pool,
        health_check_timeout,
        ..
    }): State<AppState>,
) -> Result<&'static str> {
    timeout(health_check_timeout, check_health(db_pool))
        .await
        .map_err(|_| AppHealthError::Timeout)??;
    Ok("ok")
}

pub async fn check_health(db_pool: Arc<DbConnectionPool>) -> Result<()> {
    let mut db_connection = db_pool.get().await?;
    ping_database(&mut db_connection)
        .await
        .map_err(AppHealthError::from)?;
    Ok(())
}

#[utoipa::path(
    get, path = "/version",
    responses(
        (status = 200, description = "Return the service version", body = Version),
    ),
)]
async fn version(State(AppState { config, .. }): State<AppState>) -> Json<Version> {
    Json(Version {
        git_describe: config.app_version.clone(),
    })
}

#[derive(Clone)]
pub struct SqliteConfig {
    pub database_url: String,
    pub pool_size: usize,
}

pub struct ServerConfig {
    pub port: u16,
    pub address: String,
    pub health_check_timeout: Duration,
    pub allowed_origin: Option<String>,
    pub max_body_size: usize,
    pub sqlite_config: SqliteConfig,
    pub app_version: Option<String>,
}

pub struct Server {
    app_state: AppState,
    router: NormalizePath<Router>,
}

/// The state of the whole Flora service, available to all handlers
///
/// If only the database is needed, use `State<Arc<DbConnectionPool>>`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub db_pool: Arc<DbConnectionPool>,
    pub health_check_timeout: Duration,
}

impl FromRef<AppState> for Arc<DbConnectionPool> {
    fn from_ref(input: &AppState) -> Self {
        input.db_pool.clone()
    }
}

impl AppState {
    #[tracing::instrument(skip_all, level = "info", err, name = "AppState initialization")]
    async fn init(config: ServerConfig) -> anyhow::Result<Self> {
        #[tracing::instrument(skip_all, level = "info", err, name = "SQLite connection")]
        async fn connect_db(
            SqliteConfig {
                database_url,
                pool_size,
            }: SqliteConfig,
        ) -> anyhow::Result<Arc<DbConnectionPool>> {
            info!(%database_url, "opening database");
            let pool = DbConnectionPool::try_initialize(database_url, pool_size).await?;
            Ok(Arc::new(pool))
        }
        let db_pool = connect_db(config.sqlite_config.clone())
            .in_current_span()
            .await?;

        Ok(Self {
            db_pool,
            health_check_timeout: config.health_check_timeout,
            config: Arc::new(config),
        })
    }
}

impl Server {
    #[tracing::instrument(skip_all, err, level = "info", name = "server initialization")]
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        info!("Building server...");
        let request_payload_limit = RequestBodyLimitLayer::new(config.max_body_size);

        // Build CORS layer
        let cors = match &config.allowed_origin {
            Some(origin) => CorsLayer::new()
                .allow_methods(Any)
                .allow_headers(Any)
                .allow_origin(origin.parse::<HeaderValue>()?),
            None => CorsLayer::new()
                .allow_methods(Any)
                .allow_headers(Any)
                .allow_origin(Any),
        };

        let app_state = AppState::init(config).await?;
        let router =
            tracing::debug_span!("router initialization").in_scope(service_router);

        // Configure the axum router
        let router: Router<()> = router
            .layer(OtelAxumLayer::default())
            .layer(DefaultBodyLimit::disable())
            .layer(request_payload_limit)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(app_state.clone());
        let normalizing_router = NormalizePathLayer::trim_trailing_slash().layer(router);

        Ok(Self {
            app_state,
            router: normalizing_router,
        })
    }

    pub async fn start(self) -> std::io::Result<()> {
        let Self { app_state, router } = self;
        let ServerConfig { address, port, .. } = app_state.config.as_ref();

        info!(%address, port, "Running server...");
        let service = ServiceExt::<axum::extract::Request>::into_make_service(router);
        let listener = tokio::net::TcpListener::bind((address.as_str(), *port)).await?;
        axum::serve(listener, service)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
