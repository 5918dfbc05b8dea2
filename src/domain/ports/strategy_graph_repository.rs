//! Strategy graph store port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EdgeType, NodeStatus, NodeType, StrategyDomain, StrategyEdge, StrategyNode};

/// Filter criteria for listing nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub organization_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub status: Option<NodeStatus>,
    pub domain: Option<StrategyDomain>,
    pub node_type: Option<NodeType>,
}

impl NodeFilter {
    pub fn for_organization(organization_id: Uuid) -> Self {
        Self {
            organization_id: Some(organization_id),
            ..Default::default()
        }
    }

    pub fn in_plan(mut self, plan_id: Option<Uuid>) -> Self {
        self.plan_id = plan_id;
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Filter criteria for listing edges.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub organization_id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub edge_type: Option<EdgeType>,
}

/// Repository interface for strategy nodes and edges.
///
/// Lists are returned in insertion order so that graph algorithms break
/// ties deterministically.
#[async_trait]
pub trait StrategyGraphRepository: Send + Sync {
    async fn create_node(&self, node: &StrategyNode) -> DomainResult<()>;

    async fn get_node(&self, id: Uuid) -> DomainResult<Option<StrategyNode>>;

    /// Persist `node`, read at `node.version`. The stored version becomes
    /// `node.version + 1`; a stale version fails with `ConcurrencyConflict`.
    async fn update_node(&self, node: &StrategyNode) -> DomainResult<()>;

    async fn list_nodes(&self, filter: NodeFilter) -> DomainResult<Vec<StrategyNode>>;

    async fn create_edge(&self, edge: &StrategyEdge) -> DomainResult<()>;

    async fn get_edge(&self, id: Uuid) -> DomainResult<Option<StrategyEdge>>;

    async fn delete_edge(&self, id: Uuid) -> DomainResult<()>;

    async fn list_edges(&self, filter: EdgeFilter) -> DomainResult<Vec<StrategyEdge>>;
}
