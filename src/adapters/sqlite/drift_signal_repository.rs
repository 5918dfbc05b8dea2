//! SQLite implementation of the DriftSignalRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    format_datetime, format_optional_datetime, parse_datetime, parse_enum, parse_optional_datetime,
    parse_optional_uuid, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DriftDirection, DriftSeverity, DriftSignal, DriftSignalFilter, StrategyDomain};
use crate::domain::ports::DriftSignalRepository;

const COLUMNS: &str = "id, organization_id, cycle_id, domain, metric_name, node_id, expected_value, \
     actual_value, drift_percent, direction, severity, auto_correctable, resolved, sample_count, \
     recommended_action, detected_at, resolved_at";

#[derive(Clone)]
pub struct SqliteDriftSignalRepository {
    pool: SqlitePool,
}

impl SqliteDriftSignalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriftSignalRepository for SqliteDriftSignalRepository {
    async fn create(&self, signal: &DriftSignal) -> DomainResult<()> {
        sqlx::query(&format!(
            "INSERT INTO drift_signals ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(signal.id.to_string())
        .bind(signal.organization_id.to_string())
        .bind(signal.cycle_id.map(|id| id.to_string()))
        .bind(signal.domain.as_str())
        .bind(&signal.metric_name)
        .bind(signal.node_id.map(|id| id.to_string()))
        .bind(signal.expected_value)
        .bind(signal.actual_value)
        .bind(signal.drift_percent)
        .bind(signal.direction.as_str())
        .bind(signal.severity.as_str())
        .bind(signal.auto_correctable)
        .bind(signal.resolved)
        .bind(signal.sample_count as i64)
        .bind(&signal.recommended_action)
        .bind(format_datetime(&signal.detected_at))
        .bind(format_optional_datetime(signal.resolved_at.as_ref()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<DriftSignal>> {
        let row: Option<DriftSignalRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM drift_signals WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(DriftSignal::try_from).transpose()
    }

    async fn update(&self, signal: &DriftSignal) -> DomainResult<()> {
        let result = sqlx::query("UPDATE drift_signals SET resolved = ?, resolved_at = ? WHERE id = ?")
            .bind(signal.resolved)
            .bind(format_optional_datetime(signal.resolved_at.as_ref()))
            .bind(signal.id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::DriftSignalNotFound(signal.id));
        }

        Ok(())
    }

    async fn list(&self, organization_id: Uuid, filter: DriftSignalFilter) -> DomainResult<Vec<DriftSignal>> {
        let mut query = format!("SELECT {COLUMNS} FROM drift_signals WHERE organization_id = ?");
        let mut bindings: Vec<String> = vec![organization_id.to_string()];

        if let Some(cycle_id) = &filter.cycle_id {
            query.push_str(" AND cycle_id = ?");
            bindings.push(cycle_id.to_string());
        }
        if filter.unresolved_only {
            query.push_str(" AND resolved = 0");
        }
        query.push_str(" ORDER BY detected_at DESC, rowid DESC");

        let mut q = sqlx::query_as::<_, DriftSignalRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<DriftSignalRow> = q.fetch_all(&self.pool).await?;
        let signals = rows
            .into_iter()
            .map(DriftSignal::try_from)
            .collect::<DomainResult<Vec<_>>>()?;

        // Severity is stored as text, so the threshold is applied after decoding
        Ok(match filter.min_severity {
            Some(min) => signals.into_iter().filter(|s| s.severity >= min).collect(),
            None => signals,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DriftSignalRow {
    id: String,
    organization_id: String,
    cycle_id: Option<String>,
    domain: String,
    metric_name: Option<String>,
    node_id: Option<String>,
    expected_value: f64,
    actual_value: f64,
    drift_percent: f64,
    direction: String,
    severity: String,
    auto_correctable: bool,
    resolved: bool,
    sample_count: i64,
    recommended_action: String,
    detected_at: String,
    resolved_at: Option<String>,
}

impl TryFrom<DriftSignalRow> for DriftSignal {
    type Error = DomainError;

    fn try_from(row: DriftSignalRow) -> Result<Self, Self::Error> {
        Ok(DriftSignal {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            cycle_id: parse_optional_uuid(row.cycle_id)?,
            domain: parse_enum("domain", &row.domain, StrategyDomain::from_str)?,
            metric_name: row.metric_name,
            node_id: parse_optional_uuid(row.node_id)?,
            expected_value: row.expected_value,
            actual_value: row.actual_value,
            drift_percent: row.drift_percent,
            direction: parse_enum("direction", &row.direction, DriftDirection::from_str)?,
            severity: parse_enum("severity", &row.severity, DriftSeverity::from_str)?,
            auto_correctable: row.auto_correctable,
            resolved: row.resolved,
            sample_count: row.sample_count.max(0) as usize,
            recommended_action: row.recommended_action,
            detected_at: parse_datetime(&row.detected_at)?,
            resolved_at: parse_optional_datetime(row.resolved_at)?,
        })
    }
}
