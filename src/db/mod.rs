//! Results store: one SQLite file per crawl.
//!
//! [`Database::open`] creates or resumes the file and brings its schema up to
//! date. Every card is then written through the `put_*` batches, each its own
//! transaction, so a crawl interrupted at any point leaves a consistent file
//! that the next run continues into. [`Database::close`] drains the pool and
//! reports the totals the file ended with.

mod migrations;
mod models;
mod queries;

pub use models::*;
pub use queries::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::info;

/// Writes are strictly sequential; the second connection serves reads.
const MAX_CONNECTIONS: u32 = 2;

/// Handle to the results store. Opened once and shared by every writer.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Open the results store at `path`, creating the file and its parent
    /// directory if needed, and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the file cannot
    /// be opened or a migration fails.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create results store directory {}", parent.display())
            })?;
        }

        // Comments must point at a stored post
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open results store {}", path.display()))?;

        migrations::run(&pool).await?;

        let db = Self {
            pool,
            path: path.to_path_buf(),
        };
        let existing = db.counts().await?;
        info!(
            path = %path.display(),
            actors = existing.actors,
            posts = existing.posts,
            comments = existing.comments,
            "Results store open"
        );

        Ok(db)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current row totals.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn counts(&self) -> Result<StoreCounts> {
        store_counts(&self.pool).await
    }

    /// Report the final totals and close the pool. Clones of this handle
    /// fail every call afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the totals cannot be read. The pool is closed
    /// either way.
    pub async fn close(&self) -> Result<StoreCounts> {
        let totals = self.counts().await;
        self.pool.close().await;
        totals
    }
}
