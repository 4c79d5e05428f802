//! Opening the catalog.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// One writer at a time is all SQLite allows; the rest serve reads while a
/// scan holds the write lock.
const POOL_SIZE: u32 = 5;
/// Writers overlapping for longer than this surface as `Busy` and go
/// through the repository's retry policy.
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings with no typed equivalent on [`SqliteConnectOptions`]. Applied to
/// every pooled connection as it opens.
const CONNECTION_PRAGMAS: &str = r#"
    PRAGMA wal_autocheckpoint = 800;
    PRAGMA cache_size = -8192;
    PRAGMA temp_store = MEMORY;
    PRAGMA analysis_limit = 1000;
"#;

/// Connection pool for the catalog database.
///
/// The catalog is the system of record for everything the engine knows about
/// a library, and the only point of lock contention between workers.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the catalog at `path`, creating an empty one if it does not exist
    /// yet. Pending migrations run before this returns.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = catalog_options().filename(path.as_ref()).create_if_missing(true);
        Self::open(options, POOL_SIZE).await
    }

    /// A throwaway catalog that lives as long as the returned handle.
    ///
    /// Held to a single connection: each in-memory connection would
    /// otherwise see its own empty database. Available outside of tests so
    /// that dependent crates can use it in theirs.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::open(catalog_options().filename(":memory:"), 1).await
    }

    async fn open(options: SqliteConnectOptions, size: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(size)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .after_connect(|conn, meta| Box::pin(tune_connection(conn, meta)))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    #[instrument("migrating catalog", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Refresh query planner statistics, then close every connection.
    pub async fn close(&self) {
        if let Err(err) = sqlx::query("PRAGMA optimize").execute(&self.pool).await {
            tracing::debug!(error = %err, "could not optimize catalog before closing");
        }
        self.pool.close().await;
    }
}

fn catalog_options() -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
        .auto_vacuum(SqliteAutoVacuum::None)
}

async fn tune_connection(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
    sqlx::query(CONNECTION_PRAGMAS).execute(conn).await?;
    Ok(())
}
