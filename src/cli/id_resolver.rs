//! Short ID prefix resolution for CLI commands.
//!
//! Any unique prefix of a UUID is accepted in place of the full ID,
//! similar to git short hashes.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Entities addressable by ID prefix, with the table that stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Node,
    Edge,
    DriftSignal,
    Snapshot,
    Adjustment,
    Cycle,
}

impl Entity {
    fn label(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Edge => "edge",
            Self::DriftSignal => "drift signal",
            Self::Snapshot => "balance snapshot",
            Self::Adjustment => "adjustment",
            Self::Cycle => "refinement cycle",
        }
    }

    fn query(self) -> &'static str {
        match self {
            Self::Node => "SELECT id FROM strategy_nodes WHERE id LIKE ?",
            Self::Edge => "SELECT id FROM strategy_edges WHERE id LIKE ?",
            Self::DriftSignal => "SELECT id FROM drift_signals WHERE id LIKE ?",
            Self::Snapshot => "SELECT id FROM balance_snapshots WHERE id LIKE ?",
            Self::Adjustment => "SELECT id FROM reinforcement_adjustments WHERE id LIKE ?",
            Self::Cycle => "SELECT id FROM refinement_cycles WHERE id LIKE ?",
        }
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("ID prefix must not be empty");
    }
    if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        bail!("Invalid ID prefix '{prefix}': must contain only hex characters and dashes");
    }
    Ok(())
}

/// Resolve an ID prefix to a full UUID.
pub async fn resolve_id(pool: &SqlitePool, entity: Entity, prefix: &str) -> Result<Uuid> {
    // Fast path: a full UUID is returned without a lookup
    if let Ok(uuid) = Uuid::parse_str(prefix) {
        return Ok(uuid);
    }

    validate_prefix(prefix)?;

    let pattern = format!("{}%", prefix.to_lowercase());
    let rows: Vec<(String,)> = sqlx::query_as(entity.query())
        .bind(&pattern)
        .fetch_all(pool)
        .await?;

    match rows.len() {
        0 => bail!("No {} found matching '{}'", entity.label(), prefix),
        1 => Ok(Uuid::parse_str(&rows[0].0)?),
        n => {
            let mut msg = format!("Ambiguous prefix '{}': matches {} {}s:", prefix, n, entity.label());
            for row in &rows {
                msg.push_str(&format!("\n  {}", row.0));
            }
            bail!("{}", msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteStrategyGraphRepository};
    use crate::domain::models::{NodeType, StrategyDomain, StrategyNode};
    use crate::domain::ports::StrategyGraphRepository;

    #[test]
    fn test_validate_prefix() {
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("xyz").is_err());
        assert!(validate_prefix("ab12-").is_ok());
    }

    #[tokio::test]
    async fn test_resolve_node_prefix() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteStrategyGraphRepository::new(pool.clone());
        let node = StrategyNode::new(Uuid::new_v4(), "Audit backlinks", NodeType::Action, StrategyDomain::Seo);
        repo.create_node(&node).await.unwrap();

        let full = node.id.to_string();
        assert_eq!(resolve_id(&pool, Entity::Node, &full[..8]).await.unwrap(), node.id);
        assert_eq!(resolve_id(&pool, Entity::Node, &full).await.unwrap(), node.id);

        let err = resolve_id(&pool, Entity::Edge, &full[..8]).await.unwrap_err();
        assert!(err.to_string().contains("No edge found"));
    }
}
