//! SQLite implementation of the StrategyGraphRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{
    format_datetime, format_optional_datetime, parse_datetime, parse_enum, parse_json_or_default,
    parse_optional_datetime, parse_optional_uuid, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EdgeType, NodeStatus, NodeType, RiskLevel, StrategyDomain, StrategyEdge, StrategyNode,
};
use crate::domain::ports::{EdgeFilter, NodeFilter, StrategyGraphRepository};

const NODE_COLUMNS: &str = "id, organization_id, plan_id, name, description, node_type, domain, \
     priority, risk_level, status, progress, estimated_duration_hours, actual_duration_hours, \
     start_date, due_date, completed_at, kpi_targets, created_at, updated_at, version";

const EDGE_COLUMNS: &str =
    "id, organization_id, source_id, target_id, edge_type, weight, is_critical, created_at";

#[derive(Clone)]
pub struct SqliteStrategyGraphRepository {
    pool: SqlitePool,
}

impl SqliteStrategyGraphRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn node_exists(&self, id: Uuid) -> DomainResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM strategy_nodes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl StrategyGraphRepository for SqliteStrategyGraphRepository {
    async fn create_node(&self, node: &StrategyNode) -> DomainResult<()> {
        let kpi_json = serde_json::to_string(&node.kpi_targets)?;

        sqlx::query(
            r#"INSERT INTO strategy_nodes (id, organization_id, plan_id, name, description, node_type, domain,
               priority, risk_level, status, progress, estimated_duration_hours, actual_duration_hours,
               start_date, due_date, completed_at, kpi_targets, created_at, updated_at, version)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(node.id.to_string())
        .bind(node.organization_id.to_string())
        .bind(node.plan_id.map(|id| id.to_string()))
        .bind(&node.name)
        .bind(&node.description)
        .bind(node.node_type.as_str())
        .bind(node.domain.as_str())
        .bind(i64::from(node.priority))
        .bind(node.risk_level.as_str())
        .bind(node.status.as_str())
        .bind(i64::from(node.progress))
        .bind(node.estimated_duration_hours)
        .bind(node.actual_duration_hours)
        .bind(format_optional_datetime(node.start_date.as_ref()))
        .bind(format_optional_datetime(node.due_date.as_ref()))
        .bind(format_optional_datetime(node.completed_at.as_ref()))
        .bind(&kpi_json)
        .bind(format_datetime(&node.created_at))
        .bind(format_datetime(&node.updated_at))
        .bind(node.version as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_node(&self, id: Uuid) -> DomainResult<Option<StrategyNode>> {
        let row: Option<NodeRow> =
            sqlx::query_as(&format!("SELECT {NODE_COLUMNS} FROM strategy_nodes WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(StrategyNode::try_from).transpose()
    }

    async fn update_node(&self, node: &StrategyNode) -> DomainResult<()> {
        let kpi_json = serde_json::to_string(&node.kpi_targets)?;

        let result = sqlx::query(
            r#"UPDATE strategy_nodes SET plan_id = ?, name = ?, description = ?, priority = ?,
               risk_level = ?, status = ?, progress = ?, estimated_duration_hours = ?,
               actual_duration_hours = ?, start_date = ?, due_date = ?, completed_at = ?,
               kpi_targets = ?, updated_at = ?, version = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(node.plan_id.map(|id| id.to_string()))
        .bind(&node.name)
        .bind(&node.description)
        .bind(i64::from(node.priority))
        .bind(node.risk_level.as_str())
        .bind(node.status.as_str())
        .bind(i64::from(node.progress))
        .bind(node.estimated_duration_hours)
        .bind(node.actual_duration_hours)
        .bind(format_optional_datetime(node.start_date.as_ref()))
        .bind(format_optional_datetime(node.due_date.as_ref()))
        .bind(format_optional_datetime(node.completed_at.as_ref()))
        .bind(&kpi_json)
        .bind(format_datetime(&node.updated_at))
        .bind((node.version + 1) as i64)
        .bind(node.id.to_string())
        .bind(node.version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            if self.node_exists(node.id).await? {
                return Err(DomainError::ConcurrencyConflict {
                    entity: "strategy_node".to_string(),
                    id: node.id.to_string(),
                });
            }
            return Err(DomainError::NodeNotFound(node.id));
        }

        Ok(())
    }

    async fn list_nodes(&self, filter: NodeFilter) -> DomainResult<Vec<StrategyNode>> {
        let mut query = format!("SELECT {NODE_COLUMNS} FROM strategy_nodes WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(org) = &filter.organization_id {
            query.push_str(" AND organization_id = ?");
            bindings.push(org.to_string());
        }
        if let Some(plan) = &filter.plan_id {
            query.push_str(" AND plan_id = ?");
            bindings.push(plan.to_string());
        }
        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(domain) = &filter.domain {
            query.push_str(" AND domain = ?");
            bindings.push(domain.as_str().to_string());
        }
        if let Some(node_type) = &filter.node_type {
            query.push_str(" AND node_type = ?");
            bindings.push(node_type.as_str().to_string());
        }

        query.push_str(" ORDER BY rowid");

        let mut q = sqlx::query_as::<_, NodeRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<NodeRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(StrategyNode::try_from).collect()
    }

    async fn create_edge(&self, edge: &StrategyEdge) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO strategy_edges (id, organization_id, source_id, target_id, edge_type, weight, is_critical, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(edge.id.to_string())
        .bind(edge.organization_id.to_string())
        .bind(edge.source_id.to_string())
        .bind(edge.target_id.to_string())
        .bind(edge.edge_type.as_str())
        .bind(edge.weight)
        .bind(edge.is_critical)
        .bind(format_datetime(&edge.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_edge(&self, id: Uuid) -> DomainResult<Option<StrategyEdge>> {
        let row: Option<EdgeRow> =
            sqlx::query_as(&format!("SELECT {EDGE_COLUMNS} FROM strategy_edges WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(StrategyEdge::try_from).transpose()
    }

    async fn delete_edge(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM strategy_edges WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::EdgeNotFound(id));
        }

        Ok(())
    }

    async fn list_edges(&self, filter: EdgeFilter) -> DomainResult<Vec<StrategyEdge>> {
        let mut query = format!("SELECT {EDGE_COLUMNS} FROM strategy_edges WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(org) = &filter.organization_id {
            query.push_str(" AND organization_id = ?");
            bindings.push(org.to_string());
        }
        if let Some(source) = &filter.source_id {
            query.push_str(" AND source_id = ?");
            bindings.push(source.to_string());
        }
        if let Some(target) = &filter.target_id {
            query.push_str(" AND target_id = ?");
            bindings.push(target.to_string());
        }
        if let Some(edge_type) = &filter.edge_type {
            query.push_str(" AND edge_type = ?");
            bindings.push(edge_type.as_str().to_string());
        }

        query.push_str(" ORDER BY rowid");

        let mut q = sqlx::query_as::<_, EdgeRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<EdgeRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(StrategyEdge::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct NodeRow {
    id: String,
    organization_id: String,
    plan_id: Option<String>,
    name: String,
    description: String,
    node_type: String,
    domain: String,
    priority: i64,
    risk_level: String,
    status: String,
    progress: i64,
    estimated_duration_hours: Option<f64>,
    actual_duration_hours: Option<f64>,
    start_date: Option<String>,
    due_date: Option<String>,
    completed_at: Option<String>,
    kpi_targets: Option<String>,
    created_at: String,
    updated_at: String,
    version: i64,
}

impl TryFrom<NodeRow> for StrategyNode {
    type Error = DomainError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        let kpi_targets: BTreeMap<String, f64> = parse_json_or_default(row.kpi_targets)?;

        Ok(StrategyNode {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            plan_id: parse_optional_uuid(row.plan_id)?,
            name: row.name,
            description: row.description,
            node_type: parse_enum("node_type", &row.node_type, NodeType::from_str)?,
            domain: parse_enum("domain", &row.domain, StrategyDomain::from_str)?,
            priority: row.priority.clamp(0, 100) as u8,
            risk_level: parse_enum("risk_level", &row.risk_level, RiskLevel::from_str)?,
            status: parse_enum("status", &row.status, NodeStatus::from_str)?,
            progress: row.progress.clamp(0, 100) as u8,
            estimated_duration_hours: row.estimated_duration_hours,
            actual_duration_hours: row.actual_duration_hours,
            start_date: parse_optional_datetime(row.start_date)?,
            due_date: parse_optional_datetime(row.due_date)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            kpi_targets,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            version: row.version.max(0) as u64,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EdgeRow {
    id: String,
    organization_id: String,
    source_id: String,
    target_id: String,
    edge_type: String,
    weight: f64,
    is_critical: bool,
    created_at: String,
}

impl TryFrom<EdgeRow> for StrategyEdge {
    type Error = DomainError;

    fn try_from(row: EdgeRow) -> Result<Self, Self::Error> {
        Ok(StrategyEdge {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            source_id: parse_uuid(&row.source_id)?,
            target_id: parse_uuid(&row.target_id)?,
            edge_type: parse_enum("edge_type", &row.edge_type, EdgeType::from_str)?,
            weight: row.weight,
            is_critical: row.is_critical,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup_test_repo() -> SqliteStrategyGraphRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteStrategyGraphRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get_node() {
        let repo = setup_test_repo().await;
        let org = Uuid::new_v4();
        let node = StrategyNode::new(org, "Publish pillar pages", NodeType::Action, StrategyDomain::Content)
            .with_duration(6.5)
            .with_kpi_target("articles", 12.0);

        repo.create_node(&node).await.unwrap();

        let fetched = repo.get_node(node.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Publish pillar pages");
        assert_eq!(fetched.domain, StrategyDomain::Content);
        assert_eq!(fetched.estimated_duration_hours, Some(6.5));
        assert_eq!(fetched.kpi_targets.get("articles"), Some(&12.0));
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn test_update_node_detects_stale_version() {
        let repo = setup_test_repo().await;
        let node = StrategyNode::new(Uuid::new_v4(), "Audit", NodeType::Tactic, StrategyDomain::Seo);
        repo.create_node(&node).await.unwrap();

        let mut first = node.clone();
        first.progress = 40;
        repo.update_node(&first).await.unwrap();

        let mut second = node.clone();
        second.progress = 90;
        let err = repo.update_node(&second).await.unwrap_err();
        assert!(matches!(err, DomainError::ConcurrencyConflict { .. }));

        let stored = repo.get_node(node.id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 40);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_update_missing_node_is_not_found() {
        let repo = setup_test_repo().await;
        let node = StrategyNode::new(Uuid::new_v4(), "Ghost", NodeType::Action, StrategyDomain::Ads);
        let err = repo.update_node(&node).await.unwrap_err();
        assert!(matches!(err, DomainError::NodeNotFound(id) if id == node.id));
    }

    #[tokio::test]
    async fn test_list_nodes_filters_and_keeps_insertion_order() {
        let repo = setup_test_repo().await;
        let org = Uuid::new_v4();
        let plan = Uuid::new_v4();

        let a = StrategyNode::new(org, "A", NodeType::Action, StrategyDomain::Seo).with_plan(plan);
        let b = StrategyNode::new(org, "B", NodeType::Action, StrategyDomain::Ads);
        let c = StrategyNode::new(org, "C", NodeType::Action, StrategyDomain::Seo)
            .with_plan(plan)
            .with_status(NodeStatus::InProgress);
        let other = StrategyNode::new(Uuid::new_v4(), "X", NodeType::Action, StrategyDomain::Seo);
        for node in [&a, &b, &c, &other] {
            repo.create_node(node).await.unwrap();
        }

        let all = repo.list_nodes(NodeFilter::for_organization(org)).await.unwrap();
        let names: Vec<_> = all.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);

        let planned = repo
            .list_nodes(NodeFilter::for_organization(org).in_plan(Some(plan)))
            .await
            .unwrap();
        assert_eq!(planned.len(), 2);

        let running = repo
            .list_nodes(NodeFilter::for_organization(org).with_status(NodeStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, c.id);
    }

    #[tokio::test]
    async fn test_edges_round_trip_and_delete() {
        let repo = setup_test_repo().await;
        let org = Uuid::new_v4();
        let a = StrategyNode::new(org, "A", NodeType::Action, StrategyDomain::Seo);
        let b = StrategyNode::new(org, "B", NodeType::Action, StrategyDomain::Seo);
        repo.create_node(&a).await.unwrap();
        repo.create_node(&b).await.unwrap();

        let edge = StrategyEdge::new(org, a.id, b.id, EdgeType::DependsOn).critical();
        repo.create_edge(&edge).await.unwrap();

        let into_b = repo
            .list_edges(EdgeFilter {
                target_id: Some(b.id),
                edge_type: Some(EdgeType::DependsOn),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(into_b.len(), 1);
        assert!(into_b[0].is_critical);

        repo.delete_edge(edge.id).await.unwrap();
        assert!(repo.get_edge(edge.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete_edge(edge.id).await.unwrap_err(),
            DomainError::EdgeNotFound(_)
        ));
    }
}
