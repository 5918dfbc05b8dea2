//! SQLite implementation of the AdjustmentRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    format_datetime, format_optional_datetime, parse_datetime, parse_enum, parse_json_or_default,
    parse_optional_datetime, parse_optional_uuid, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AdjustmentChange, AdjustmentFilter, AdjustmentTarget, AdjustmentType, ReinforcementAdjustment,
};
use crate::domain::ports::AdjustmentRepository;

const COLUMNS: &str = "id, organization_id, cycle_id, target, target_id, adjustment_type, change, \
     previous_value, new_value, magnitude, confidence, trigger_reason, supporting_evidence, \
     drift_signal_id, requires_approval, approved, applied_at, expected_impact, actual_impact, \
     created_at, updated_at, version";

#[derive(Clone)]
pub struct SqliteAdjustmentRepository {
    pool: SqlitePool,
}

impl SqliteAdjustmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdjustmentRepository for SqliteAdjustmentRepository {
    async fn create(&self, adjustment: &ReinforcementAdjustment) -> DomainResult<()> {
        let headline = adjustment.change.headline();

        sqlx::query(&format!(
            "INSERT INTO reinforcement_adjustments ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(adjustment.id.to_string())
        .bind(adjustment.organization_id.to_string())
        .bind(adjustment.cycle_id.map(|id| id.to_string()))
        .bind(adjustment.target.as_str())
        .bind(adjustment.target_id.map(|id| id.to_string()))
        .bind(adjustment.adjustment_type.as_str())
        .bind(serde_json::to_string(&adjustment.change)?)
        .bind(headline.map(|c| c.previous))
        .bind(headline.map(|c| c.new))
        .bind(adjustment.magnitude)
        .bind(adjustment.confidence)
        .bind(&adjustment.trigger_reason)
        .bind(serde_json::to_string(&adjustment.supporting_evidence)?)
        .bind(adjustment.drift_signal_id.map(|id| id.to_string()))
        .bind(adjustment.requires_approval)
        .bind(adjustment.approved)
        .bind(format_optional_datetime(adjustment.applied_at.as_ref()))
        .bind(adjustment.expected_impact)
        .bind(adjustment.actual_impact)
        .bind(format_datetime(&adjustment.created_at))
        .bind(format_datetime(&adjustment.updated_at))
        .bind(adjustment.version as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ReinforcementAdjustment>> {
        let row: Option<AdjustmentRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM reinforcement_adjustments WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(ReinforcementAdjustment::try_from).transpose()
    }

    async fn update(&self, adjustment: &ReinforcementAdjustment) -> DomainResult<()> {
        let headline = adjustment.change.headline();

        let result = sqlx::query(
            r#"UPDATE reinforcement_adjustments SET change = ?, previous_value = ?, new_value = ?,
               approved = ?, applied_at = ?, actual_impact = ?, updated_at = ?, version = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(serde_json::to_string(&adjustment.change)?)
        .bind(headline.map(|c| c.previous))
        .bind(headline.map(|c| c.new))
        .bind(adjustment.approved)
        .bind(format_optional_datetime(adjustment.applied_at.as_ref()))
        .bind(adjustment.actual_impact)
        .bind(format_datetime(&adjustment.updated_at))
        .bind((adjustment.version + 1) as i64)
        .bind(adjustment.id.to_string())
        .bind(adjustment.version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM reinforcement_adjustments WHERE id = ?")
                .bind(adjustment.id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            return Err(match exists {
                Some(_) => DomainError::ConcurrencyConflict {
                    entity: "reinforcement_adjustment".to_string(),
                    id: adjustment.id.to_string(),
                },
                None => DomainError::AdjustmentNotFound(adjustment.id),
            });
        }

        Ok(())
    }

    async fn list(
        &self,
        organization_id: Uuid,
        filter: AdjustmentFilter,
    ) -> DomainResult<Vec<ReinforcementAdjustment>> {
        let mut query = format!("SELECT {COLUMNS} FROM reinforcement_adjustments WHERE organization_id = ?");
        let mut bindings: Vec<String> = vec![organization_id.to_string()];

        if let Some(cycle_id) = &filter.cycle_id {
            query.push_str(" AND cycle_id = ?");
            bindings.push(cycle_id.to_string());
        }
        if filter.pending_only {
            query.push_str(" AND approved IS NULL");
        }
        if let Some(target) = &filter.target {
            query.push_str(" AND target = ?");
            bindings.push(target.as_str().to_string());
        }
        query.push_str(" ORDER BY created_at, rowid");

        let mut q = sqlx::query_as::<_, AdjustmentRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<AdjustmentRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(ReinforcementAdjustment::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct AdjustmentRow {
    id: String,
    organization_id: String,
    cycle_id: Option<String>,
    target: String,
    target_id: Option<String>,
    adjustment_type: String,
    change: String,
    #[allow(dead_code)]
    previous_value: Option<f64>,
    #[allow(dead_code)]
    new_value: Option<f64>,
    magnitude: f64,
    confidence: f64,
    trigger_reason: String,
    supporting_evidence: Option<String>,
    drift_signal_id: Option<String>,
    requires_approval: bool,
    approved: Option<bool>,
    applied_at: Option<String>,
    expected_impact: f64,
    actual_impact: Option<f64>,
    created_at: String,
    updated_at: String,
    version: i64,
}

impl TryFrom<AdjustmentRow> for ReinforcementAdjustment {
    type Error = DomainError;

    fn try_from(row: AdjustmentRow) -> Result<Self, Self::Error> {
        let change: AdjustmentChange = serde_json::from_str(&row.change)?;

        Ok(ReinforcementAdjustment {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            cycle_id: parse_optional_uuid(row.cycle_id)?,
            target: parse_enum("target", &row.target, AdjustmentTarget::from_str)?,
            target_id: parse_optional_uuid(row.target_id)?,
            adjustment_type: parse_enum("adjustment_type", &row.adjustment_type, AdjustmentType::from_str)?,
            change,
            magnitude: row.magnitude,
            confidence: row.confidence,
            trigger_reason: row.trigger_reason,
            supporting_evidence: parse_json_or_default(row.supporting_evidence)?,
            drift_signal_id: parse_optional_uuid(row.drift_signal_id)?,
            requires_approval: row.requires_approval,
            approved: row.approved,
            applied_at: parse_optional_datetime(row.applied_at)?,
            expected_impact: row.expected_impact,
            actual_impact: row.actual_impact,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            version: row.version.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{KpiAdjustment, Signal, SignalSource, ValueChange};
    use chrono::Utc;

    fn adjustment(org: Uuid) -> ReinforcementAdjustment {
        let now = Utc::now();
        ReinforcementAdjustment {
            id: Uuid::new_v4(),
            organization_id: org,
            cycle_id: None,
            target: AdjustmentTarget::KpiTarget,
            target_id: None,
            adjustment_type: AdjustmentType::Strengthen,
            change: AdjustmentChange::KpiTarget(KpiAdjustment {
                node_id: None,
                metric_name: "ctr".to_string(),
                change: ValueChange::scaled(2.0, 1.6),
            }),
            magnitude: 60.0,
            confidence: 0.9,
            trigger_reason: "ctr above plan".to_string(),
            supporting_evidence: vec![Signal::new(SignalSource::Execution, 0.6, 0.9, "ctr above plan")],
            drift_signal_id: None,
            requires_approval: true,
            approved: None,
            applied_at: None,
            expected_impact: 21.6,
            actual_impact: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_pending_filter_and_versioned_update() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteAdjustmentRepository::new(pool);
        let org = Uuid::new_v4();

        let mut adj = adjustment(org);
        repo.create(&adj).await.unwrap();
        let other = adjustment(org);
        repo.create(&other).await.unwrap();

        let pending = repo
            .list(org, AdjustmentFilter { pending_only: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].supporting_evidence.len(), 1);

        let stale = adj.clone();
        adj.approved = Some(false);
        repo.update(&adj).await.unwrap();
        assert!(matches!(
            repo.update(&stale).await.unwrap_err(),
            DomainError::ConcurrencyConflict { .. }
        ));

        let pending = repo
            .list(org, AdjustmentFilter { pending_only: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, other.id);

        let stored = repo.get(adj.id).await.unwrap().unwrap();
        assert_eq!(stored.approved, Some(false));
        assert_eq!(stored.version, 2);
    }
}
