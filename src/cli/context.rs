//! Shared setup for commands that need the store.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::id_resolver::{resolve_id, Entity};
use crate::adapters::sqlite::initialize_database;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::services::StrategyEngine;

pub struct CliContext {
    pub pool: SqlitePool,
    pub config: Config,
    pub engine: StrategyEngine,
}

impl CliContext {
    /// Load project configuration and open the database.
    pub async fn open() -> Result<Self> {
        let config = ConfigLoader::load()?;
        let pool = initialize_database(&config.database)
            .await
            .context("Failed to initialize database. Run 'stratagem init' first.")?;
        let engine = StrategyEngine::new(pool.clone(), &config);
        Ok(Self { pool, config, engine })
    }

    pub async fn resolve(&self, entity: Entity, prefix: &str) -> Result<Uuid> {
        resolve_id(&self.pool, entity, prefix).await
    }
}
