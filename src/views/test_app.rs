//! Exposes [TestApp] and [TestAppBuilder] to ease the setup of the
//! test axum server and its database connection pool.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use axum_test::TestRequest;
use axum_test::TestServer;
use axum_tracing_opentelemetry::middleware::OtelAxumLayer;
use common::tracing::NoopSpanExporter;
use common::tracing::Stream;
use common::tracing::Telemetry;
use common::tracing::TracingConfig;
use common::tracing::create_tracing_subscriber;
use database::DbConnectionPool;
use serde::de::DeserializeOwned;
use tempfile::TempDir;
use tower::ServiceExt as _;
use tower_http::normalize_path::NormalizePath;
use tower_http::trace::TraceLayer;
use tracing_subscriber::filter::LevelFilter;
use url::Url;

use super::AppState;
use super::DEFAULT_MAX_BODY_SIZE;
use super::Server;
use super::ServerConfig;
use super::SqliteConfig;
use super::service_router;
use crate::error::InternalError;

/// A builder interface for [TestApp]
///
/// Use [TestAppBuilder::default_app] to get a default app backed by a fresh database.
pub(crate) struct TestAppBuilder {
    app_version: Option<String>,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            app_version: None,
        }
    }

    pub fn app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version = Some(app_version.into());
        self
    }

    pub fn default_app() -> TestApp {
        TestAppBuilder::new().build()
    }

    pub fn build(self) -> TestApp {
        // Generate test server config
        let config = ServerConfig {
            port: 0,
            address: String::default(),
            health_check_timeout: Duration::from_millis(500),
            allowed_origin: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            // Never opened, the pool is built by `DbConnectionPool::for_tests` below
            sqlite_config: SqliteConfig {
                database_url: String::from("<test database>"),
                pool_size: 2,
            },
            app_version: self.app_version,
        };

        // Setup tracing
        let tracing_config = TracingConfig {
            stream: Stream::Stdout,
            log_level: LevelFilter::TRACE,
            directives: vec![],
            telemetry: Some(Telemetry {
                service_name: "flora-test".into(),
                endpoint: Url::parse("http://localhost:4317").unwrap(),
            }),
        };
        let sub = create_tracing_subscriber(tracing_config, NoopSpanExporter);
        let tracing_guard = tracing::subscriber::set_default(sub);

        // Create database pool
        let db_pool = Arc::new(DbConnectionPool::for_tests());

        let app_state = AppState {
            db_pool,
            health_check_timeout: config.health_check_timeout,
            config: Arc::new(config),
        };

        // Configure the axum router
        let router: Router<()> = service_router()
            .layer(OtelAxumLayer::default())
            .layer(TraceLayer::new_for_http())
            .with_state(app_state.clone());

        // Run server
        let server = TestServer::new(router).expect("test server should build properly");

        TestApp {
            server,
            app_state,
            tracing_guard,
        }
    }
}

/// Wraps an underlying, fully configured, axum service
///
/// It also holds a reference to the database connection pool.
pub(crate) struct TestApp {
    server: TestServer,
    app_state: AppState,
    #[expect(unused)] // included here to extend its lifetime, not meant to be used in any way
    tracing_guard: tracing::subscriber::DefaultGuard,
}

impl TestApp {
    pub fn db_pool(&self) -> Arc<DbConnectionPool> {
        self.app_state.db_pool.clone()
    }

    pub async fn fetch(&self, req: TestRequest) -> TestResponse {
        tracing::trace!(request = ?req);
        let response = req.await;
        TestResponse::new(response)
    }

    pub fn get(&self, path: &str) -> TestRequest {
        self.server.get(&trim_path(path))
    }

    pub fn post(&self, path: &str) -> TestRequest {
        self.server.post(&trim_path(path))
    }

    pub fn put(&self, path: &str) -> TestRequest {
        self.server.put(&trim_path(path))
    }

    pub fn delete(&self, path: &str) -> TestRequest {
        self.server.delete(&trim_path(path))
    }
}

// The normalizing layer wraps the router itself and cannot be given to the test server.
// Test paths are under our control, trimming them here is enough.
fn trim_path(path: &str) -> String {
    if let Some(path) = path.strip_suffix('/') {
        path.to_owned()
    } else if path.contains("/?") {
        path.replace("/?", "?")
    } else {
        path.to_owned()
    }
}

/// A [Server] built the way `runserver` builds it, middlewares included,
/// over a temporary database file
///
/// Use it to exercise what [TestApp] skips: CORS, body limits, path normalization
/// and the connection pool size.
pub(crate) struct ServerStack {
    service: NormalizePath<Router>,
    db_pool: Arc<DbConnectionPool>,
    _directory: TempDir,
}

impl ServerStack {
    pub async fn build(pool_size: usize, max_body_size: usize) -> Self {
        let directory = tempfile::tempdir().expect("temporary directory should be created");
        let database_url = directory
            .path()
            .join("flora.db")
            .to_string_lossy()
            .into_owned();
        let config = ServerConfig {
            port: 0,
            address: String::default(),
            health_check_timeout: Duration::from_millis(500),
            allowed_origin: None,
            max_body_size,
            sqlite_config: SqliteConfig {
                database_url,
                pool_size,
            },
            app_version: None,
        };
        let Server { app_state, router } = Server::new(config)
            .await
            .expect("server should build properly");
        Self {
            service: router,
            db_pool: app_state.db_pool,
            _directory: directory,
        }
    }

    pub fn db_pool(&self) -> Arc<DbConnectionPool> {
        self.db_pool.clone()
    }

    /// A handle on the whole service, to send requests from other tasks
    pub fn service(&self) -> NormalizePath<Router> {
        self.service.clone()
    }

    pub async fn call(&self, request: Request) -> Response {
        let Ok(response) = self.service().oneshot(request).await;
        response
    }
}

/// The response of a [TestApp] request, with assertions tailored to Flora payloads
pub struct TestResponse {
    inner: axum_test::TestResponse,
}

impl TestResponse {
    #[tracing::instrument(name = "Response", level = "debug", skip(inner), fields(status = ?inner.status_code()))]
    fn new(inner: axum_test::TestResponse) -> Self {
        tracing::trace!(response = ?inner);
        Self { inner }
    }

    /// The body, pretty printed when it is JSON
    fn body_lossy(&self) -> String {
        let bytes = self.inner.as_bytes();
        match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(json) => serde_json::to_string_pretty(&json).unwrap_or_default(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    #[track_caller]
    pub fn assert_status(self, expected_status: StatusCode) -> Self {
        let actual_status = self.inner.status_code();
        if actual_status != expected_status {
            let body = self.body_lossy();
            pretty_assertions::assert_eq!(
                actual_status,
                expected_status,
                "unexpected status code body={body}"
            );
        }
        self
    }

    /// Asserts that the response is a Flora error of the given status and type
    #[track_caller]
    pub fn assert_error(self, expected_status: StatusCode, expected_type: &str) -> InternalError {
        let error: InternalError = self.assert_status(expected_status).json_into();
        pretty_assertions::assert_eq!(error.get_type(), expected_type);
        pretty_assertions::assert_eq!(error.get_status(), expected_status);
        error
    }

    pub fn bytes(self) -> Vec<u8> {
        self.inner.into_bytes().into()
    }

    #[track_caller]
    pub fn json_into<T: DeserializeOwned>(self) -> T {
        match serde_json::from_slice(self.inner.as_bytes()) {
            Ok(value) => value,
            Err(error) => {
                let body = self.body_lossy();
                tracing::error!(%error, %body, "could not deserialize the test response");
                panic!("could not deserialize the test response: {error}\nbody={body}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::trim_path;

    #[test]
    fn trailing_slashes_are_trimmed() {
        assert_eq!(trim_path("/api/plants/"), "/api/plants");
        assert_eq!(trim_path("/api/plants/?page=1"), "/api/plants?page=1");
        assert_eq!(trim_path("/api/plants/12"), "/api/plants/12");
    }
}
