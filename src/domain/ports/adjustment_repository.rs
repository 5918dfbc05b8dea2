//! Reinforcement adjustment repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AdjustmentFilter, ReinforcementAdjustment};

#[async_trait]
pub trait AdjustmentRepository: Send + Sync {
    async fn create(&self, adjustment: &ReinforcementAdjustment) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<ReinforcementAdjustment>>;

    /// Versioned update, same contract as node updates.
    async fn update(&self, adjustment: &ReinforcementAdjustment) -> DomainResult<()>;

    /// Adjustments for an organization, oldest first.
    async fn list(
        &self,
        organization_id: Uuid,
        filter: AdjustmentFilter,
    ) -> DomainResult<Vec<ReinforcementAdjustment>>;
}
