//! Balance snapshot repository port. Snapshots are append-only.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::DomainBalanceSnapshot;

#[async_trait]
pub trait BalanceSnapshotRepository: Send + Sync {
    async fn create(&self, snapshot: &DomainBalanceSnapshot) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<DomainBalanceSnapshot>>;

    /// Most recent snapshot for an organization.
    async fn latest(&self, organization_id: Uuid) -> DomainResult<Option<DomainBalanceSnapshot>>;

    /// Snapshots for an organization, newest first.
    async fn list(&self, organization_id: Uuid, limit: usize) -> DomainResult<Vec<DomainBalanceSnapshot>>;
}
