mod tracing_instrumentation;

use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;

use diesel::ConnectionError;
use diesel::ConnectionResult;
use diesel::sql_query;
use diesel::sqlite::SqliteConnection;
use diesel_async::AsyncConnection;
use diesel_async::RunQueryDsl;
use diesel_async::SimpleAsyncConnection as _;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::ManagerConfig;
use diesel_async::pooled_connection::deadpool::Object;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_migrations::EmbeddedMigrations;
use diesel_migrations::MigrationHarness as _;
use futures::future::BoxFuture;
use futures_util::FutureExt as _;
use tokio::sync::OwnedRwLockWriteGuard;
use tokio::sync::RwLock;
use tracing::trace;

/// SQLite connections run on tokio's blocking thread pool
pub type AsyncSqliteConnection = SyncConnectionWrapper<SqliteConnection>;

pub type DbConnectionConfig = AsyncDieselConnectionManager<AsyncSqliteConnection>;

const MIGRATIONS: EmbeddedMigrations = diesel_migrations::embed_migrations!();

/// Applied on every new connection of the pool
const CONNECTION_SETUP: &str = "
    PRAGMA busy_timeout = 5000;
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;
";

#[derive(Clone)]
pub struct DbConnection {
    inner: Arc<RwLock<Object<AsyncSqliteConnection>>>,
}

pub struct WriteHandle {
    guard: OwnedRwLockWriteGuard<Object<AsyncSqliteConnection>>,
}

impl DbConnection {
    pub fn new(inner: Arc<RwLock<Object<AsyncSqliteConnection>>>) -> Self {
        Self { inner }
    }

    pub async fn write(&self) -> WriteHandle {
        WriteHandle {
            guard: self.inner.clone().write_owned().await,
        }
    }
}

impl Deref for WriteHandle {
    type Target = AsyncSqliteConnection;

    fn deref(&self) -> &Self::Target {
        self.guard.deref()
    }
}

impl DerefMut for WriteHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.deref_mut()
    }
}

/// Wrapper for connection pooling over a single SQLite database file
///
/// The database file is created and migrated when the pool is initialized.
///
/// # Testing pool
///
/// In test mode, [DbConnectionPool::for_tests] creates a fresh database in a temporary
/// directory, which is removed once the last clone of the pool is dropped.
#[derive(Clone)]
pub struct DbConnectionPool {
    pool: Arc<Pool<AsyncSqliteConnection>>,
    #[cfg(any(test, feature = "testing"))]
    _test_directory: Option<Arc<tempfile::TempDir>>,
}

#[derive(Debug, thiserror::Error)]
#[error("an error occurred while building the database pool: '{0}'")]
pub struct DatabasePoolBuildError(#[from] diesel_async::pooled_connection::deadpool::BuildError);

#[derive(Debug, thiserror::Error)]
#[error("an error occurred while getting a connection from the database pool: '{0}'")]
pub struct DatabasePoolError(#[from] diesel_async::pooled_connection::deadpool::PoolError);

#[derive(Debug, thiserror::Error)]
pub enum DatabaseInitError {
    #[error("could not open database '{url}': {source}")]
    Connection {
        url: String,
        source: ConnectionError,
    },
    #[error("could not apply database migrations: {0}")]
    Migration(Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    PoolBuild(#[from] DatabasePoolBuildError),
    #[error("database initialization task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DbConnectionPool {
    /// Opens (or creates) the database at `url`, applies pending migrations and
    /// creates a connection pool of at most `max_size` connections
    ///
    /// In a testing environment, you should use `DbConnectionPool::for_tests` instead.
    pub async fn try_initialize(url: String, max_size: usize) -> Result<Self, DatabaseInitError> {
        let migrations_url = url.clone();
        tokio::task::spawn_blocking(move || run_migrations(&migrations_url)).await??;
        let pool = create_connection_pool(url, max_size)?.into();
        Ok(Self {
            pool,
            #[cfg(any(test, feature = "testing"))]
            _test_directory: None,
        })
    }

    /// Get a connection from the pool
    ///
    /// Every query run on the returned connection is traced.
    pub async fn get(&self) -> Result<DbConnection, DatabasePoolError> {
        let mut connection = self.pool.get().await?;
        connection.set_instrumentation(tracing_instrumentation::TracingInstrumentation);
        Ok(DbConnection::new(Arc::new(RwLock::new(connection))))
    }

    /// Create a connection pool over a brand new database for testing purposes
    #[cfg(any(test, feature = "testing"))]
    pub fn for_tests() -> Self {
        let directory = tempfile::tempdir().expect("Failed to create test database directory");
        let url = directory
            .path()
            .join("flora_test.db")
            .to_string_lossy()
            .into_owned();
        run_migrations(&url).expect("Failed to migrate test database");
        tracing::debug!(%url, "Using test database");
        let pool = create_connection_pool(url, 2).expect("Failed to build test database pool");
        Self {
            pool: Arc::new(pool),
            _test_directory: Some(Arc::new(directory)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("could not ping the database: '{0}'")]
pub struct PingError(#[from] diesel::result::Error);

pub async fn ping_database(conn: &mut DbConnection) -> Result<(), PingError> {
    sql_query("SELECT 1")
        .execute(conn.write().await.deref_mut())
        .await?;
    trace!("Database ping successful");
    Ok(())
}

fn run_migrations(url: &str) -> Result<(), DatabaseInitError> {
    use diesel::Connection as _;

    let mut conn =
        SqliteConnection::establish(url).map_err(|source| DatabaseInitError::Connection {
            url: url.to_owned(),
            source,
        })?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(DatabaseInitError::Migration)?;
    for migration in applied {
        tracing::info!(%migration, "applied database migration");
    }
    Ok(())
}

fn create_connection_pool(
    url: String,
    max_size: usize,
) -> Result<Pool<AsyncSqliteConnection>, DatabasePoolBuildError> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup = Box::new(establish_connection);
    let manager = DbConnectionConfig::new_with_config(url, manager_config);
    Ok(Pool::builder(manager).max_size(max_size).build()?)
}

fn establish_connection(url: &str) -> BoxFuture<'_, ConnectionResult<AsyncSqliteConnection>> {
    let fut = async {
        let mut conn = AsyncSqliteConnection::establish(url).await?;
        conn.batch_execute(CONNECTION_SETUP)
            .await
            .map_err(ConnectionError::CouldntSetupConfiguration)?;
        Ok(conn)
    };
    fut.boxed()
}
