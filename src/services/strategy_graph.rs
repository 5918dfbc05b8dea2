//! Strategy graph service: node and edge maintenance plus the graph
//! algorithms (cycle rejection, root discovery, path enumeration, critical path).
//!
//! Edges read `source -> target`, "source precedes target". The DEPENDS_ON
//! subgraph is kept acyclic by rejecting any edge whose target can already
//! reach its source.

use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CriticalPath, EdgeSpec, EdgeType, NodeSpec, NodeStatus, NodeType, RiskLevel, StrategyDomain,
    StrategyEdge, StrategyGraphView, StrategyNode, DEFAULT_PRIORITY,
};
use crate::domain::ports::{EdgeFilter, NodeFilter, StrategyGraphRepository};

/// Upper bound on enumerated root-to-leaf paths in a graph view.
pub const DEFAULT_MAX_PATHS: usize = 1000;

pub struct StrategyGraphService {
    repository: Arc<dyn StrategyGraphRepository>,
}

impl StrategyGraphService {
    pub fn new(repository: Arc<dyn StrategyGraphRepository>) -> Self {
        Self { repository }
    }

    /// Create a node from caller input, applying defaults.
    #[instrument(skip(self, spec), fields(organization_id = %spec.organization_id, name = %spec.name))]
    pub async fn add_node(&self, spec: NodeSpec) -> DomainResult<StrategyNode> {
        let node_type = NodeType::from_str(&spec.node_type)
            .ok_or_else(|| DomainError::ValidationFailed(format!("Invalid node type: {}", spec.node_type)))?;
        let domain = StrategyDomain::from_str(&spec.domain)
            .ok_or_else(|| DomainError::ValidationFailed(format!("Invalid domain: {}", spec.domain)))?;
        let risk_level = match &spec.risk_level {
            Some(raw) => RiskLevel::from_str(raw)
                .ok_or_else(|| DomainError::ValidationFailed(format!("Invalid risk level: {raw}")))?,
            None => RiskLevel::default(),
        };

        let mut node = StrategyNode::new(spec.organization_id, spec.name, node_type, domain)
            .with_priority(spec.priority.unwrap_or(DEFAULT_PRIORITY))
            .with_schedule(spec.start_date, spec.due_date);
        node.plan_id = spec.plan_id;
        node.description = spec.description;
        node.risk_level = risk_level;
        node.estimated_duration_hours = spec.estimated_duration_hours;
        node.kpi_targets = spec.kpi_targets;

        node.validate().map_err(DomainError::ValidationFailed)?;
        self.repository.create_node(&node).await?;

        info!(node_id = %node.id, node_type = node.node_type.as_str(), domain = node.domain.as_str(), "Created strategy node");
        Ok(node)
    }

    /// Create an edge. DEPENDS_ON edges that would close a cycle are rejected
    /// before anything is written.
    #[instrument(skip(self, spec), fields(source = %spec.source_id, target = %spec.target_id, edge_type = %spec.edge_type))]
    pub async fn add_edge(&self, spec: EdgeSpec) -> DomainResult<StrategyEdge> {
        let edge_type = EdgeType::from_str(&spec.edge_type)
            .ok_or_else(|| DomainError::ValidationFailed(format!("Invalid edge type: {}", spec.edge_type)))?;

        if spec.source_id == spec.target_id {
            return Err(DomainError::ValidationFailed("An edge cannot connect a node to itself".to_string()));
        }
        let weight = spec.weight.unwrap_or(1.0);
        if !weight.is_finite() {
            return Err(DomainError::ValidationFailed(format!("Edge weight must be finite, got {weight}")));
        }

        let source = self.get_node(spec.source_id).await?;
        let target = self.get_node(spec.target_id).await?;
        for node in [&source, &target] {
            if node.organization_id != spec.organization_id {
                return Err(DomainError::ValidationFailed(format!(
                    "Node {} belongs to another organization",
                    node.id
                )));
            }
        }

        if edge_type == EdgeType::DependsOn {
            let existing = self
                .repository
                .list_edges(EdgeFilter {
                    organization_id: Some(spec.organization_id),
                    edge_type: Some(EdgeType::DependsOn),
                    ..Default::default()
                })
                .await?;

            if let Some(path) = find_dependency_path(&existing, target.id, source.id) {
                warn!(path_len = path.len(), "Rejected DEPENDS_ON edge that would create a cycle");
                return Err(DomainError::DependencyCycle(path));
            }
        }

        let mut edge = StrategyEdge::new(spec.organization_id, source.id, target.id, edge_type).with_weight(weight);
        edge.is_critical = spec.is_critical;
        self.repository.create_edge(&edge).await?;

        info!(edge_id = %edge.id, "Created strategy edge");
        Ok(edge)
    }

    pub async fn remove_edge(&self, edge_id: Uuid) -> DomainResult<()> {
        self.repository.delete_edge(edge_id).await
    }

    pub async fn get_node(&self, id: Uuid) -> DomainResult<StrategyNode> {
        self.repository.get_node(id).await?.ok_or(DomainError::NodeNotFound(id))
    }

    pub async fn list_nodes(&self, filter: NodeFilter) -> DomainResult<Vec<StrategyNode>> {
        self.repository.list_nodes(filter).await
    }

    /// Nodes and edges of an organization, optionally restricted to one plan.
    /// Edges are kept only when both endpoints are in the node set.
    pub async fn load_graph(
        &self,
        organization_id: Uuid,
        plan_id: Option<Uuid>,
    ) -> DomainResult<(Vec<StrategyNode>, Vec<StrategyEdge>)> {
        let nodes = self
            .repository
            .list_nodes(NodeFilter::for_organization(organization_id).in_plan(plan_id))
            .await?;
        let ids: HashSet<Uuid> = nodes.iter().map(|n| n.id).collect();

        let edges = self
            .repository
            .list_edges(EdgeFilter {
                organization_id: Some(organization_id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(|e| ids.contains(&e.source_id) && ids.contains(&e.target_id))
            .collect();

        Ok((nodes, edges))
    }

    /// Full read model: nodes, edges, roots, bounded path enumeration and the critical path.
    #[instrument(skip(self))]
    pub async fn get_graph(
        &self,
        organization_id: Uuid,
        plan_id: Option<Uuid>,
        max_paths: usize,
    ) -> DomainResult<StrategyGraphView> {
        let (nodes, edges) = self.load_graph(organization_id, plan_id).await?;

        let roots = find_roots(&nodes, &edges);
        let (paths, paths_truncated) = enumerate_paths(&nodes, &edges, max_paths);
        let critical_path = critical_path(&nodes, &edges);

        Ok(StrategyGraphView {
            nodes,
            edges,
            roots,
            paths,
            paths_truncated,
            critical_path,
        })
    }

    /// Nodes `node_id` depends on (sources of DEPENDS_ON edges into it).
    pub async fn dependencies(&self, node_id: Uuid) -> DomainResult<Vec<StrategyNode>> {
        self.get_node(node_id).await?;
        let edges = self
            .repository
            .list_edges(EdgeFilter {
                target_id: Some(node_id),
                edge_type: Some(EdgeType::DependsOn),
                ..Default::default()
            })
            .await?;
        self.resolve_nodes(edges.iter().map(|e| e.source_id)).await
    }

    /// Nodes that depend on `node_id` (targets of DEPENDS_ON edges out of it).
    pub async fn dependents(&self, node_id: Uuid) -> DomainResult<Vec<StrategyNode>> {
        self.get_node(node_id).await?;
        let edges = self
            .repository
            .list_edges(EdgeFilter {
                source_id: Some(node_id),
                edge_type: Some(EdgeType::DependsOn),
                ..Default::default()
            })
            .await?;
        self.resolve_nodes(edges.iter().map(|e| e.target_id)).await
    }

    async fn resolve_nodes(&self, ids: impl Iterator<Item = Uuid>) -> DomainResult<Vec<StrategyNode>> {
        let mut nodes = Vec::new();
        for id in ids {
            nodes.push(self.get_node(id).await?);
        }
        Ok(nodes)
    }

    /// Move a node to a new status, stamping schedule fields on the way.
    #[instrument(skip(self))]
    pub async fn update_node_status(&self, node_id: Uuid, status: NodeStatus) -> DomainResult<StrategyNode> {
        let mut node = self.get_node(node_id).await?;

        if !node.status.can_transition_to(status) {
            return Err(DomainError::InvalidStateTransition {
                from: node.status.as_str().to_string(),
                to: status.as_str().to_string(),
                reason: "transition not allowed".to_string(),
            });
        }

        let now = Utc::now();
        match status {
            NodeStatus::InProgress if node.start_date.is_none() => node.start_date = Some(now),
            NodeStatus::Completed => {
                node.progress = 100;
                node.completed_at = Some(now);
                if let Some(start) = node.start_date {
                    let hours = (now - start).num_seconds().max(0) as f64 / 3600.0;
                    node.actual_duration_hours = Some(hours);
                }
            }
            _ => {}
        }
        node.status = status;
        node.updated_at = now;

        self.repository.update_node(&node).await?;
        node.version += 1;
        Ok(node)
    }

    pub async fn update_node_progress(&self, node_id: Uuid, progress: u8) -> DomainResult<StrategyNode> {
        if progress > 100 {
            return Err(DomainError::ValidationFailed(format!("Progress {progress} outside 0-100")));
        }
        let mut node = self.get_node(node_id).await?;
        if node.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: node.status.as_str().to_string(),
                to: node.status.as_str().to_string(),
                reason: "progress of a closed node is frozen".to_string(),
            });
        }

        node.progress = progress;
        node.updated_at = Utc::now();
        self.repository.update_node(&node).await?;
        node.version += 1;
        Ok(node)
    }
}

/// Existing DEPENDS_ON path `from -> ... -> to`, if any. Breadth-first so the
/// reported path is a shortest one.
pub fn find_dependency_path(edges: &[StrategyEdge], from: Uuid, to: Uuid) -> Option<Vec<Uuid>> {
    let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for edge in edges.iter().filter(|e| e.edge_type == EdgeType::DependsOn) {
        adjacency.entry(edge.source_id).or_default().push(edge.target_id);
    }

    let mut parent: HashMap<Uuid, Uuid> = HashMap::new();
    let mut visited: HashSet<Uuid> = HashSet::from([from]);
    let mut queue = VecDeque::from([from]);

    while let Some(current) = queue.pop_front() {
        if current == to {
            let mut path = vec![to];
            let mut cursor = to;
            while let Some(&prev) = parent.get(&cursor) {
                path.push(prev);
                cursor = prev;
            }
            path.reverse();
            return Some(path);
        }
        for &next in adjacency.get(&current).map(Vec::as_slice).unwrap_or_default() {
            if visited.insert(next) {
                parent.insert(next, current);
                queue.push_back(next);
            }
        }
    }

    None
}

/// Nodes that no DEPENDS_ON/ENABLES edge points into, in insertion order.
pub fn find_roots(nodes: &[StrategyNode], edges: &[StrategyEdge]) -> Vec<Uuid> {
    let targeted: HashSet<Uuid> = edges
        .iter()
        .filter(|e| e.edge_type.is_flow())
        .map(|e| e.target_id)
        .collect();

    nodes
        .iter()
        .map(|n| n.id)
        .filter(|id| !targeted.contains(id))
        .collect()
}

/// Depth-first enumeration of root-to-leaf paths over DEPENDS_ON/ENABLES
/// edges. A node is never revisited within one path. Stops after
/// `max_paths` paths and reports whether it did.
pub fn enumerate_paths(
    nodes: &[StrategyNode],
    edges: &[StrategyEdge],
    max_paths: usize,
) -> (Vec<Vec<Uuid>>, bool) {
    let known: HashSet<Uuid> = nodes.iter().map(|n| n.id).collect();
    let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for edge in edges.iter().filter(|e| e.edge_type.is_flow()) {
        if known.contains(&edge.source_id) && known.contains(&edge.target_id) {
            adjacency.entry(edge.source_id).or_default().push(edge.target_id);
        }
    }

    let mut paths = Vec::new();
    let mut truncated = false;
    for root in find_roots(nodes, edges) {
        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        if !walk_paths(root, &adjacency, &mut path, &mut on_path, &mut paths, max_paths) {
            truncated = true;
            break;
        }
    }

    (paths, truncated)
}

// Returns false once the path budget is exhausted.
fn walk_paths(
    node: Uuid,
    adjacency: &HashMap<Uuid, Vec<Uuid>>,
    path: &mut Vec<Uuid>,
    on_path: &mut HashSet<Uuid>,
    paths: &mut Vec<Vec<Uuid>>,
    max_paths: usize,
) -> bool {
    path.push(node);
    on_path.insert(node);

    let next: Vec<Uuid> = adjacency
        .get(&node)
        .map(|succ| succ.iter().copied().filter(|n| !on_path.contains(n)).collect())
        .unwrap_or_default();

    let mut within_budget = true;
    if next.is_empty() {
        if paths.len() >= max_paths {
            within_budget = false;
        } else {
            paths.push(path.clone());
        }
    } else {
        for succ in next {
            if !walk_paths(succ, adjacency, path, on_path, paths, max_paths) {
                within_budget = false;
                break;
            }
        }
    }

    on_path.remove(&node);
    path.pop();
    within_budget
}

/// Longest duration-weighted path over edges that are DEPENDS_ON or marked
/// critical.
///
/// Kahn traversal seeded in node insertion order; `dist[v]` is the earliest
/// start of `v` and only moves on a strictly longer candidate, so ties keep
/// the first predecessor seen. The path ends at the node with the greatest
/// finish time (`dist + duration`), first in insertion order on ties. Nodes
/// caught in a cycle of critical edges are never scheduled and are ignored.
pub fn critical_path(nodes: &[StrategyNode], edges: &[StrategyEdge]) -> CriticalPath {
    if nodes.is_empty() {
        return CriticalPath::default();
    }

    let index: HashMap<Uuid, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
    let durations: Vec<f64> = nodes.iter().map(StrategyNode::duration_hours).collect();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree = vec![0usize; nodes.len()];
    for edge in edges.iter().filter(|e| e.is_scheduling_edge()) {
        if let (Some(&s), Some(&t)) = (index.get(&edge.source_id), index.get(&edge.target_id)) {
            if s != t {
                successors[s].push(t);
                in_degree[t] += 1;
            }
        }
    }

    let mut dist = vec![0.0_f64; nodes.len()];
    let mut predecessor: Vec<Option<usize>> = vec![None; nodes.len()];
    let mut scheduled = vec![false; nodes.len()];
    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();

    while let Some(u) = queue.pop_front() {
        scheduled[u] = true;
        let finish = dist[u] + durations[u];
        for &v in &successors[u] {
            if finish > dist[v] {
                dist[v] = finish;
                predecessor[v] = Some(u);
            }
            in_degree[v] -= 1;
            if in_degree[v] == 0 {
                queue.push_back(v);
            }
        }
    }

    let mut end: Option<usize> = None;
    for i in (0..nodes.len()).filter(|&i| scheduled[i]) {
        let finish = dist[i] + durations[i];
        if end.is_none_or(|e| finish > dist[e] + durations[e]) {
            end = Some(i);
        }
    }

    let Some(end) = end else {
        return CriticalPath::default();
    };

    let mut path = vec![end];
    let mut cursor = end;
    while let Some(prev) = predecessor[cursor] {
        path.push(prev);
        cursor = prev;
    }
    path.reverse();

    CriticalPath {
        node_ids: path.iter().map(|&i| nodes[i].id).collect(),
        total_duration_hours: dist[end] + durations[end],
    }
}
