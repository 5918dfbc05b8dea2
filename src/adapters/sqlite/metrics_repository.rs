//! SQLite implementation of the MetricsRepository.
//!
//! Time-series reads are lenient: a row that cannot be decoded is logged and
//! skipped so one bad observation never hides the rest of the window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{MetricObservation, PerformanceRecord, StrategyDomain};
use crate::domain::ports::MetricsRepository;

#[derive(Clone)]
pub struct SqliteMetricsRepository {
    pool: SqlitePool,
}

impl SqliteMetricsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsRepository for SqliteMetricsRepository {
    async fn record_observation(&self, observation: &MetricObservation) -> DomainResult<()> {
        if !observation.value.is_finite() {
            return Err(DomainError::ValidationFailed(format!(
                "Observation value for {} must be finite",
                observation.metric_name
            )));
        }

        sqlx::query(
            r#"INSERT INTO metric_observations (id, organization_id, domain, metric_name, value, target, observed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(observation.id.to_string())
        .bind(observation.organization_id.to_string())
        .bind(observation.domain.as_str())
        .bind(&observation.metric_name)
        .bind(observation.value)
        .bind(observation.target)
        .bind(format_datetime(&observation.observed_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_observations(
        &self,
        organization_id: Uuid,
        since: DateTime<Utc>,
    ) -> DomainResult<Vec<MetricObservation>> {
        // Non-numeric values come back NULL and are dropped during decoding
        let rows: Vec<ObservationRow> = sqlx::query_as(
            r#"SELECT id, organization_id, domain, metric_name,
                      CASE WHEN typeof(value) IN ('real', 'integer') THEN CAST(value AS REAL) END AS value,
                      CASE WHEN typeof(target) IN ('real', 'integer') THEN CAST(target AS REAL) END AS target,
                      observed_at
               FROM metric_observations
               WHERE organization_id = ? AND observed_at >= ?
               ORDER BY observed_at, rowid"#,
        )
        .bind(organization_id.to_string())
        .bind(format_datetime(&since))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                match MetricObservation::try_from(row) {
                    Ok(observation) => Some(observation),
                    Err(e) => {
                        warn!(row_id = %id, error = %e, "Skipping malformed metric observation");
                        None
                    }
                }
            })
            .collect())
    }

    async fn record_performance(&self, record: &PerformanceRecord) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO performance_records (id, organization_id, domain, metric_name, adjustment_id,
               achievement_percent, on_track, recorded_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(record.organization_id.to_string())
        .bind(record.domain.as_str())
        .bind(&record.metric_name)
        .bind(record.adjustment_id.map(|id| id.to_string()))
        .bind(record.achievement_percent)
        .bind(record.on_track)
        .bind(format_datetime(&record.recorded_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_performance(
        &self,
        organization_id: Uuid,
        domain: Option<StrategyDomain>,
        limit: usize,
    ) -> DomainResult<Vec<PerformanceRecord>> {
        let mut query = String::from(
            r#"SELECT id, organization_id, domain, metric_name, adjustment_id,
                      CASE WHEN typeof(achievement_percent) IN ('real', 'integer')
                           THEN CAST(achievement_percent AS REAL) END AS achievement_percent,
                      on_track, recorded_at
               FROM performance_records WHERE organization_id = ?"#,
        );
        if domain.is_some() {
            query.push_str(" AND domain = ?");
        }
        query.push_str(" ORDER BY recorded_at DESC, rowid DESC LIMIT ?");

        let mut q = sqlx::query_as::<_, PerformanceRow>(&query).bind(organization_id.to_string());
        if let Some(domain) = domain {
            q = q.bind(domain.as_str());
        }
        let rows = q.bind(limit as i64).fetch_all(&self.pool).await?;

        let mut records: Vec<PerformanceRecord> = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                match PerformanceRecord::try_from(row) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(row_id = %id, error = %e, "Skipping malformed performance record");
                        None
                    }
                }
            })
            .collect();
        records.reverse();
        Ok(records)
    }

    async fn performance_domains(&self, organization_id: Uuid) -> DomainResult<Vec<StrategyDomain>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT domain FROM performance_records WHERE organization_id = ? ORDER BY domain")
                .bind(organization_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(domain,)| {
                let parsed = StrategyDomain::from_str(&domain);
                if parsed.is_none() {
                    warn!(domain = %domain, "Skipping performance records for unknown domain");
                }
                parsed
            })
            .collect())
    }

    async fn set_domain_allocations(
        &self,
        organization_id: Uuid,
        allocations: &BTreeMap<StrategyDomain, f64>,
    ) -> DomainResult<()> {
        let now = format_datetime(&Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM domain_allocations WHERE organization_id = ?")
            .bind(organization_id.to_string())
            .execute(&mut *tx)
            .await?;

        for (domain, percent) in allocations {
            sqlx::query(
                "INSERT INTO domain_allocations (organization_id, domain, allocation_percent, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(organization_id.to_string())
            .bind(domain.as_str())
            .bind(*percent)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_domain_allocations(&self, organization_id: Uuid) -> DomainResult<BTreeMap<StrategyDomain, f64>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT domain, allocation_percent FROM domain_allocations WHERE organization_id = ?",
        )
        .bind(organization_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut allocations = BTreeMap::new();
        for (domain, percent) in rows {
            match StrategyDomain::from_str(&domain) {
                Some(d) => {
                    allocations.insert(d, percent);
                }
                None => warn!(domain = %domain, "Skipping allocation for unknown domain"),
            }
        }
        Ok(allocations)
    }
}

#[derive(sqlx::FromRow)]
struct ObservationRow {
    id: String,
    organization_id: String,
    domain: String,
    metric_name: String,
    value: Option<f64>,
    target: Option<f64>,
    observed_at: String,
}

impl TryFrom<ObservationRow> for MetricObservation {
    type Error = DomainError;

    fn try_from(row: ObservationRow) -> Result<Self, Self::Error> {
        let value = row
            .value
            .filter(|v| v.is_finite())
            .ok_or_else(|| DomainError::SerializationError("Observation value is not numeric".to_string()))?;
        let domain = StrategyDomain::from_str(&row.domain)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid domain: {}", row.domain)))?;

        Ok(MetricObservation {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            domain,
            metric_name: row.metric_name,
            value,
            target: row.target.filter(|t| t.is_finite()),
            observed_at: parse_datetime(&row.observed_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PerformanceRow {
    id: String,
    organization_id: String,
    domain: String,
    metric_name: Option<String>,
    adjustment_id: Option<String>,
    achievement_percent: Option<f64>,
    on_track: bool,
    recorded_at: String,
}

impl TryFrom<PerformanceRow> for PerformanceRecord {
    type Error = DomainError;

    fn try_from(row: PerformanceRow) -> Result<Self, Self::Error> {
        let achievement_percent = row
            .achievement_percent
            .filter(|v| v.is_finite())
            .ok_or_else(|| DomainError::SerializationError("Achievement is not numeric".to_string()))?;
        let domain = StrategyDomain::from_str(&row.domain)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid domain: {}", row.domain)))?;

        Ok(PerformanceRecord {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            domain,
            metric_name: row.metric_name,
            adjustment_id: parse_optional_uuid(row.adjustment_id)?,
            achievement_percent,
            on_track: row.on_track,
            recorded_at: parse_datetime(&row.recorded_at)?,
        })
    }
}
