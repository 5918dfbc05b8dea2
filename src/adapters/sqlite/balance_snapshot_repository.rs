//! SQLite implementation of the BalanceSnapshotRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_json_or_default, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::DomainBalanceSnapshot;
use crate::domain::ports::BalanceSnapshotRepository;

const COLUMNS: &str = "id, organization_id, cycle_id, allocations, performance_scores, balance_score, \
     entropy, gini, over_optimized, under_invested, recommended_shifts, conflicts, supersedes, created_at";

#[derive(Clone)]
pub struct SqliteBalanceSnapshotRepository {
    pool: SqlitePool,
}

impl SqliteBalanceSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BalanceSnapshotRepository for SqliteBalanceSnapshotRepository {
    async fn create(&self, snapshot: &DomainBalanceSnapshot) -> DomainResult<()> {
        sqlx::query(&format!(
            "INSERT INTO balance_snapshots ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(snapshot.id.to_string())
        .bind(snapshot.organization_id.to_string())
        .bind(snapshot.cycle_id.map(|id| id.to_string()))
        .bind(serde_json::to_string(&snapshot.allocations)?)
        .bind(serde_json::to_string(&snapshot.performance_scores)?)
        .bind(snapshot.balance_score)
        .bind(snapshot.entropy)
        .bind(snapshot.gini)
        .bind(serde_json::to_string(&snapshot.over_optimized)?)
        .bind(serde_json::to_string(&snapshot.under_invested)?)
        .bind(serde_json::to_string(&snapshot.recommended_shifts)?)
        .bind(serde_json::to_string(&snapshot.conflicts)?)
        .bind(snapshot.supersedes.map(|id| id.to_string()))
        .bind(format_datetime(&snapshot.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<DomainBalanceSnapshot>> {
        let row: Option<SnapshotRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM balance_snapshots WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(DomainBalanceSnapshot::try_from).transpose()
    }

    async fn latest(&self, organization_id: Uuid) -> DomainResult<Option<DomainBalanceSnapshot>> {
        Ok(self.list(organization_id, 1).await?.into_iter().next())
    }

    async fn list(&self, organization_id: Uuid, limit: usize) -> DomainResult<Vec<DomainBalanceSnapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM balance_snapshots WHERE organization_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(organization_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DomainBalanceSnapshot::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: String,
    organization_id: String,
    cycle_id: Option<String>,
    allocations: Option<String>,
    performance_scores: Option<String>,
    balance_score: f64,
    entropy: f64,
    gini: f64,
    over_optimized: Option<String>,
    under_invested: Option<String>,
    recommended_shifts: Option<String>,
    conflicts: Option<String>,
    supersedes: Option<String>,
    created_at: String,
}

impl TryFrom<SnapshotRow> for DomainBalanceSnapshot {
    type Error = DomainError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(DomainBalanceSnapshot {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            cycle_id: parse_optional_uuid(row.cycle_id)?,
            allocations: parse_json_or_default(row.allocations)?,
            performance_scores: parse_json_or_default(row.performance_scores)?,
            balance_score: row.balance_score,
            entropy: row.entropy,
            gini: row.gini,
            over_optimized: parse_json_or_default(row.over_optimized)?,
            under_invested: parse_json_or_default(row.under_invested)?,
            recommended_shifts: parse_json_or_default(row.recommended_shifts)?,
            conflicts: parse_json_or_default(row.conflicts)?,
            supersedes: parse_optional_uuid(row.supersedes)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
