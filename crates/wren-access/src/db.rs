use log::info;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::config::AccessConfig;
use crate::error::Result;

pub async fn db_connect(config: &AccessConfig) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database_url.clone());

    // In-memory SQLite is per connection, so tests and embedded setups keep
    // the pool at a single connection.
    options.max_connections(config.max_connections.max(1));
    options.min_connections(if is_in_memory(&config.database_url) { 1 } else { 0 });
    options.connect_timeout(config.connect_timeout());
    options.acquire_timeout(config.connect_timeout());
    options.sqlx_logging(config.sqlx_logging);

    Ok(Database::connect(options).await?)
}

/// Connect and bring the schema up to date.
pub async fn db_connect_and_migrate(config: &AccessConfig) -> Result<DatabaseConnection> {
    let db = db_connect(config).await?;
    Migrator::up(&db, None).await?;
    info!("access schema migrated");
    Ok(db)
}

fn is_in_memory(url: &str) -> bool {
    url.starts_with("sqlite:") && url.contains(":memory:")
}
