//! Drift signal repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DriftSignal, DriftSignalFilter};

#[async_trait]
pub trait DriftSignalRepository: Send + Sync {
    async fn create(&self, signal: &DriftSignal) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<DriftSignal>>;

    /// Persist the resolution state of a signal.
    async fn update(&self, signal: &DriftSignal) -> DomainResult<()>;

    /// Signals for an organization, newest first.
    async fn list(&self, organization_id: Uuid, filter: DriftSignalFilter) -> DomainResult<Vec<DriftSignal>>;
}
