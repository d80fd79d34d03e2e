use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use domain::DomainError;

pub mod schema;
pub use schema::*;

pub type SqlitePool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

pub const MEMORY_DATABASE: &str = ":memory:";

/// Applied to every pooled connection when it is first opened.
#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout_ms: u32,
}

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        diesel::sql_query(format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms))
            .execute(conn)
            .map(|_| ())
            .map_err(r2d2::Error::QueryError)
    }
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn new(database_path: &str) -> Result<Self, DomainError> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_path);

        // Every connection to `:memory:` opens its own empty database, so the
        // pool must hold on to exactly one.
        let builder = if database_path == MEMORY_DATABASE {
            r2d2::Pool::builder()
                .max_size(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            r2d2::Pool::builder()
        };

        let pool = builder
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout_ms: 5_000,
            }))
            .build(manager)
            .map_err(|e| {
                DomainError::RepositoryError(format!(
                    "Failed to create SQLite connection pool for {database_path}: {e}"
                ))
            })?;
        tracing::debug!(database_path, "SQLite pool ready");

        Ok(Database { pool })
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }
}
