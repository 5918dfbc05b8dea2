//! Time-series port: metric observations, performance records and the
//! explicit per-domain allocation table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{MetricObservation, PerformanceRecord, StrategyDomain};

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    async fn record_observation(&self, observation: &MetricObservation) -> DomainResult<()>;

    /// Observations at or after `since`, oldest first. Rows that cannot be
    /// decoded are skipped.
    async fn list_observations(
        &self,
        organization_id: Uuid,
        since: DateTime<Utc>,
    ) -> DomainResult<Vec<MetricObservation>>;

    async fn record_performance(&self, record: &PerformanceRecord) -> DomainResult<()>;

    /// The newest `limit` performance records, returned oldest first.
    /// `domain = None` spans every domain. Undecodable rows are skipped.
    async fn list_performance(
        &self,
        organization_id: Uuid,
        domain: Option<StrategyDomain>,
        limit: usize,
    ) -> DomainResult<Vec<PerformanceRecord>>;

    /// Domains with at least one performance record.
    async fn performance_domains(&self, organization_id: Uuid) -> DomainResult<Vec<StrategyDomain>>;

    /// Replace the organization's explicit allocations.
    async fn set_domain_allocations(
        &self,
        organization_id: Uuid,
        allocations: &BTreeMap<StrategyDomain, f64>,
    ) -> DomainResult<()>;

    /// Explicit allocations, empty when none were ever set.
    async fn get_domain_allocations(&self, organization_id: Uuid) -> DomainResult<BTreeMap<StrategyDomain, f64>>;
}
