use clap::Args;

use crate::views;

#[derive(Args, Debug, Clone)]
pub struct SqliteConfig {
    /// Path of the database file, created if it doesn't exist
    #[arg(long, env = "FLORA_DATABASE_URL", default_value = "database.db")]
    pub database_url: String,
    #[arg(long, env = "FLORA_DATABASE_POOL_SIZE", default_value_t = 4)]
    pub database_pool_size: usize,
}

impl From<SqliteConfig> for views::SqliteConfig {
    fn from(config: SqliteConfig) -> Self {
        Self {
            database_url: config.database_url,
            pool_size: config.database_pool_size,
        }
    }
}
