pub mod repository;

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::ValidationMode;

pub use repository::{
    CourseQuery, CourseRepository, Cursor, DeleteResult, ProjectedQuery, ReturnDocument, UpdateResult,
};

const MEMORY_URL: &str = "sqlite::memory:";

/// Handle to the document store. Cloning is cheap and shares the pool.
#[derive(Clone, Debug)]
pub struct Store {
    db: SqlitePool,
    validation: ValidationMode,
}

impl Store {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        if is_memory_url(&config.database_url) {
            return Self::in_memory(config.validation).await;
        }

        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(StoreError::Connection)?
            .create_if_missing(true)
            .with_regexp();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StoreError::Connection)?;

        info!("connected to {}", config.database_url);
        Self::init(pool, config.validation).await
    }

    /// A private store that lives as long as this handle. It is held on a
    /// single connection that is never recycled, since every new in-memory
    /// connection would see an empty database.
    pub async fn in_memory(validation: ValidationMode) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(MEMORY_URL)
            .map_err(StoreError::Connection)?
            .with_regexp();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StoreError::Connection)?;

        debug!("opened in-memory store");
        Self::init(pool, validation).await
    }

    async fn init(db: SqlitePool, validation: ValidationMode) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&db).await?;
        Ok(Self { db, validation })
    }

    pub fn courses(&self) -> CourseRepository {
        CourseRepository::new(self.db.clone(), self.validation)
    }

    pub fn validation(&self) -> ValidationMode {
        self.validation
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("select 1").execute(&self.db).await?;
        Ok(())
    }

    pub async fn close(self) {
        self.db.close().await;
        info!("store closed");
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}
