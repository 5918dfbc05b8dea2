//! Refinement cycle repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CycleStatus, RefinementCycle};

#[async_trait]
pub trait RefinementCycleRepository: Send + Sync {
    /// Insert `cycle` with the organization's next sequence number, allocated
    /// by the store in the same statement. Returns the assigned number.
    ///
    /// Two concurrent inserts for one organization never share a number; the
    /// loser fails with `ConcurrencyConflict` and may retry.
    async fn create_with_next_sequence(&self, cycle: &RefinementCycle) -> DomainResult<u64>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<RefinementCycle>>;

    async fn update(&self, cycle: &RefinementCycle) -> DomainResult<()>;

    /// Highest-sequence cycle for an organization, optionally restricted to a status.
    async fn latest(
        &self,
        organization_id: Uuid,
        status: Option<CycleStatus>,
    ) -> DomainResult<Option<RefinementCycle>>;

    /// Cycles for an organization, newest first.
    async fn list(&self, organization_id: Uuid, limit: usize) -> DomainResult<Vec<RefinementCycle>>;
}
