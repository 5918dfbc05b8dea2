//! SQLite implementation of the RefinementCycleRepository.
//!
//! Sequence numbers are allocated inside the INSERT itself and guarded by
//! `UNIQUE(organization_id, sequence_number)`, so concurrent writers from any
//! number of processes can never share a number.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    format_datetime, format_optional_datetime, is_unique_violation, parse_datetime, parse_enum,
    parse_json_or_default, parse_optional_datetime, parse_optional_uuid, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CycleStatus, CycleType, RefinementCycle};
use crate::domain::ports::RefinementCycleRepository;

const COLUMNS: &str = "id, organization_id, plan_id, sequence_number, cycle_type, status, started_at, \
     completed_at, drift_signals_found, adjustments_generated, adjustments_applied, confidence_before, \
     confidence_after, improvement_percent, summary, error_message, recommendations";

#[derive(Clone)]
pub struct SqliteRefinementCycleRepository {
    pool: SqlitePool,
}

impl SqliteRefinementCycleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefinementCycleRepository for SqliteRefinementCycleRepository {
    async fn create_with_next_sequence(&self, cycle: &RefinementCycle) -> DomainResult<u64> {
        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"INSERT INTO refinement_cycles (id, organization_id, plan_id, sequence_number, cycle_type,
               status, started_at, recommendations)
               SELECT ?, ?, ?, COALESCE(MAX(sequence_number), 0) + 1, ?, ?, ?, '[]'
               FROM refinement_cycles WHERE organization_id = ?
               RETURNING sequence_number"#,
        )
        .bind(cycle.id.to_string())
        .bind(cycle.organization_id.to_string())
        .bind(cycle.plan_id.map(|id| id.to_string()))
        .bind(cycle.cycle_type.as_str())
        .bind(cycle.status.as_str())
        .bind(format_datetime(&cycle.started_at))
        .bind(cycle.organization_id.to_string())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok((sequence,)) => Ok(sequence.max(0) as u64),
            Err(e) if is_unique_violation(&e) && e.to_string().contains("sequence_number") => {
                Err(DomainError::ConcurrencyConflict {
                    entity: "refinement_cycle_sequence".to_string(),
                    id: cycle.organization_id.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<RefinementCycle>> {
        let row: Option<CycleRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM refinement_cycles WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(RefinementCycle::try_from).transpose()
    }

    async fn update(&self, cycle: &RefinementCycle) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE refinement_cycles SET status = ?, completed_at = ?, drift_signals_found = ?,
               adjustments_generated = ?, adjustments_applied = ?, confidence_before = ?,
               confidence_after = ?, improvement_percent = ?, summary = ?, error_message = ?,
               recommendations = ?
               WHERE id = ?"#,
        )
        .bind(cycle.status.as_str())
        .bind(format_optional_datetime(cycle.completed_at.as_ref()))
        .bind(i64::from(cycle.drift_signals_found))
        .bind(i64::from(cycle.adjustments_generated))
        .bind(i64::from(cycle.adjustments_applied))
        .bind(cycle.confidence_before)
        .bind(cycle.confidence_after)
        .bind(cycle.improvement_percent)
        .bind(&cycle.summary)
        .bind(&cycle.error_message)
        .bind(serde_json::to_string(&cycle.recommendations)?)
        .bind(cycle.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::CycleNotFound(cycle.id));
        }

        Ok(())
    }

    async fn latest(
        &self,
        organization_id: Uuid,
        status: Option<CycleStatus>,
    ) -> DomainResult<Option<RefinementCycle>> {
        let mut query = format!("SELECT {COLUMNS} FROM refinement_cycles WHERE organization_id = ?");
        if status.is_some() {
            query.push_str(" AND status = ?");
        }
        query.push_str(" ORDER BY sequence_number DESC LIMIT 1");

        let mut q = sqlx::query_as::<_, CycleRow>(&query).bind(organization_id.to_string());
        if let Some(status) = status {
            q = q.bind(status.as_str());
        }

        let row: Option<CycleRow> = q.fetch_optional(&self.pool).await?;
        row.map(RefinementCycle::try_from).transpose()
    }

    async fn list(&self, organization_id: Uuid, limit: usize) -> DomainResult<Vec<RefinementCycle>> {
        let rows: Vec<CycleRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM refinement_cycles WHERE organization_id = ? ORDER BY sequence_number DESC LIMIT ?"
        ))
        .bind(organization_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RefinementCycle::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct CycleRow {
    id: String,
    organization_id: String,
    plan_id: Option<String>,
    sequence_number: i64,
    cycle_type: String,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    drift_signals_found: i64,
    adjustments_generated: i64,
    adjustments_applied: i64,
    confidence_before: Option<f64>,
    confidence_after: Option<f64>,
    improvement_percent: Option<f64>,
    summary: Option<String>,
    error_message: Option<String>,
    recommendations: Option<String>,
}

fn to_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

impl TryFrom<CycleRow> for RefinementCycle {
    type Error = DomainError;

    fn try_from(row: CycleRow) -> Result<Self, Self::Error> {
        Ok(RefinementCycle {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            plan_id: parse_optional_uuid(row.plan_id)?,
            sequence_number: row.sequence_number.max(0) as u64,
            cycle_type: parse_enum("cycle_type", &row.cycle_type, CycleType::from_str)?,
            status: parse_enum("status", &row.status, CycleStatus::from_str)?,
            started_at: parse_datetime(&row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            drift_signals_found: to_count(row.drift_signals_found),
            adjustments_generated: to_count(row.adjustments_generated),
            adjustments_applied: to_count(row.adjustments_applied),
            confidence_before: row.confidence_before,
            confidence_after: row.confidence_after,
            improvement_percent: row.improvement_percent,
            summary: row.summary,
            error_message: row.error_message,
            recommendations: parse_json_or_default(row.recommendations)?,
        })
    }
}
