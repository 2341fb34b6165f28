//! Hierarchy service
//!
//! Public operations over the department tree, each wrapped in a single
//! transaction: the tree engine computes the structural change, the store
//! persists it, and the cascade coordinator applies association effects
//! before the commit. Commands arrive already validated from the
//! presentation layer.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cascade::{CascadeCoordinator, LocationAssociations, PositionAssociations};
use crate::config::HierarchyConfig;
use crate::entity::department::{self, DepartmentNode};
use crate::error::{HierarchyError, HierarchyResult, OptionExt};
use crate::path::PATH_SEPARATOR;
use crate::store::{HierarchyStore, SeaOrmHierarchyStore};
use crate::tree;

/// Create department command
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDepartment {
    pub name: String,
    pub identifier: String,
    #[serde(rename = "parentId")]
    pub parent_id: Option<Uuid>,
}

/// Move department command
#[derive(Debug, Clone, Deserialize)]
pub struct MoveDepartment {
    #[serde(rename = "departmentId")]
    pub department_id: Uuid,
    #[serde(rename = "newParentId")]
    pub new_parent_id: Option<Uuid>,
}

/// Deactivate department command
#[derive(Debug, Clone, Deserialize)]
pub struct DeactivateDepartment {
    #[serde(rename = "departmentId")]
    pub department_id: Uuid,
}

/// Restore department command
#[derive(Debug, Clone, Deserialize)]
pub struct RestoreDepartment {
    #[serde(rename = "departmentId")]
    pub department_id: Uuid,
}

/// Children listing query
#[derive(Debug, Clone, Deserialize)]
pub struct ListChildren {
    #[serde(rename = "parentId")]
    pub parent_id: Uuid,
    #[serde(default)]
    pub page: u64,
    #[serde(rename = "pageSize", default)]
    pub page_size: u64,
}

/// Root listing query
#[derive(Debug, Clone, Deserialize)]
pub struct ListRoots {
    #[serde(default)]
    pub page: u64,
    #[serde(rename = "pageSize", default)]
    pub page_size: u64,
    /// How many descendant levels to attach eagerly to each root
    #[serde(rename = "prefetchChildDepth", default)]
    pub prefetch_child_depth: u32,
}

/// One page of department summaries
#[derive(Debug, Clone, Serialize)]
pub struct DepartmentPage {
    pub items: Vec<DepartmentNode>,
    pub total: u64,
    pub page: u64,
    #[serde(rename = "pageSize")]
    pub page_size: u64,
}

/// Department hierarchy service
pub struct HierarchyService {
    db: DatabaseConnection,
    config: HierarchyConfig,
}

impl HierarchyService {
    pub fn new(db: DatabaseConnection, config: HierarchyConfig) -> Self {
        Self { db, config }
    }

    /// Create a department under an optional parent
    pub async fn create_department(
        &self,
        cmd: CreateDepartment,
        cancel: &watch::Receiver<bool>,
    ) -> HierarchyResult<Uuid> {
        ensure_not_cancelled(cancel)?;

        let txn = self.db.begin().await?;
        let store = SeaOrmHierarchyStore::new(&txn);

        let parent = match cmd.parent_id {
            Some(parent_id) => Some(
                store
                    .get_by_id(parent_id)
                    .await?
                    .ok_or_not_found(parent_id.to_string())?,
            ),
            None => None,
        };

        let id = Uuid::new_v4();
        let dept = tree::plan_create(parent.as_ref(), id, &cmd.name, &cmd.identifier, Utc::now())?;
        store.insert(dept).await?;
        txn.commit().await?;

        info!("created department {} ({})", cmd.name, id);
        Ok(id)
    }

    /// Move a department (and its whole subtree) under a new parent,
    /// retrying with backoff when the subtree lock is contended
    pub async fn move_department(
        &self,
        cmd: MoveDepartment,
        cancel: &watch::Receiver<bool>,
    ) -> HierarchyResult<()> {
        with_lock_retries(&self.config, || self.try_move(&cmd, cancel)).await
    }

    async fn try_move(
        &self,
        cmd: &MoveDepartment,
        cancel: &watch::Receiver<bool>,
    ) -> HierarchyResult<()> {
        ensure_not_cancelled(cancel)?;

        let txn = self.db.begin().await?;
        let store = SeaOrmHierarchyStore::new(&txn);

        let rewrites = tree::move_subtree(&store, cmd.department_id, cmd.new_parent_id).await?;
        if rewrites.is_empty() {
            // Already in place; nothing to persist
            txn.rollback().await?;
            return Ok(());
        }

        // Last abort point: once the rewrite is dispatched the transaction
        // runs to commit regardless of the signal.
        ensure_not_cancelled(cancel)?;
        store.rewrite_paths(&rewrites).await?;
        txn.commit().await?;

        info!(
            "moved department {} ({} rows rewritten)",
            cmd.department_id,
            rewrites.len()
        );
        Ok(())
    }

    /// Soft-delete a department subtree and cascade to its associations
    pub async fn deactivate_department(
        &self,
        cmd: DeactivateDepartment,
        cancel: &watch::Receiver<bool>,
    ) -> HierarchyResult<()> {
        ensure_not_cancelled(cancel)?;

        let txn = self.db.begin().await?;
        let store = SeaOrmHierarchyStore::new(&txn);

        let plan = tree::deactivate_subtree(&store, cmd.department_id, Utc::now()).await?;
        if plan.is_empty() {
            // Subtree already inactive; deactivation is idempotent
            txn.rollback().await?;
            return Ok(());
        }

        store.mark_inactive(&plan.affected, plan.deleted_at).await?;

        let coordinator = CascadeCoordinator::new(
            LocationAssociations::new(&txn),
            PositionAssociations::new(&txn),
        );
        let outcome = coordinator.apply(&plan.affected, plan.deleted_at).await?;
        txn.commit().await?;

        info!(
            "deactivated {} departments, orphaned {} locations and {} positions",
            plan.affected.len(),
            outcome.orphaned_locations.len(),
            outcome.orphaned_positions.len()
        );
        Ok(())
    }

    /// Reactivate a single department. Descendants and association rows
    /// deactivated earlier stay as they are: deactivation cascades down,
    /// restoration does not.
    pub async fn restore_department(
        &self,
        cmd: RestoreDepartment,
        cancel: &watch::Receiver<bool>,
    ) -> HierarchyResult<()> {
        ensure_not_cancelled(cancel)?;

        let txn = self.db.begin().await?;
        let store = SeaOrmHierarchyStore::new(&txn);

        let dept = store
            .get_by_id(cmd.department_id)
            .await?
            .ok_or_not_found(cmd.department_id.to_string())?;
        if dept.is_active {
            txn.rollback().await?;
            return Ok(());
        }

        store.mark_active(dept.id).await?;
        txn.commit().await?;

        info!("restored department {}", cmd.department_id);
        Ok(())
    }

    /// Direct children of a department, paginated
    pub async fn list_children(&self, query: ListChildren) -> HierarchyResult<DepartmentPage> {
        let store = SeaOrmHierarchyStore::new(&self.db);
        let parent = store
            .get_by_id(query.parent_id)
            .await?
            .ok_or_not_found(query.parent_id.to_string())?;

        let (page, page_size) = self.clamp_page(query.page, query.page_size);
        let (items, total) = store.list_children(&parent, page, page_size).await?;

        Ok(DepartmentPage {
            items: items.into_iter().map(DepartmentNode::from).collect(),
            total,
            page,
            page_size,
        })
    }

    /// Top-level departments, paginated, optionally with eagerly attached
    /// descendant levels
    pub async fn list_roots(&self, query: ListRoots) -> HierarchyResult<DepartmentPage> {
        let store = SeaOrmHierarchyStore::new(&self.db);

        let (page, page_size) = self.clamp_page(query.page, query.page_size);
        let (roots, total) = store.list_roots(page, page_size).await?;

        let descendants = if query.prefetch_child_depth > 0 && !roots.is_empty() {
            store
                .list_subtree_to_depth(&roots, query.prefetch_child_depth as i32)
                .await?
        } else {
            Vec::new()
        };

        Ok(DepartmentPage {
            items: assemble_forest(roots, descendants),
            total,
            page,
            page_size,
        })
    }

    fn clamp_page(&self, page: u64, page_size: u64) -> (u64, u64) {
        let page = page.max(1);
        let page_size = if page_size == 0 {
            self.config.default_page_size
        } else {
            page_size.min(self.config.max_page_size)
        };
        (page, page_size)
    }
}

/// Check the cancellation signal at a safe point
fn ensure_not_cancelled(cancel: &watch::Receiver<bool>) -> HierarchyResult<()> {
    if *cancel.borrow() {
        return Err(HierarchyError::Cancelled);
    }
    Ok(())
}

/// Run `op`, retrying on retryable (lock contention) errors with a linear
/// backoff. Each retry re-runs the whole operation against fresh lock state.
async fn with_lock_retries<F, Fut>(config: &HierarchyConfig, mut op: F) -> HierarchyResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HierarchyResult<()>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < config.move_retry_max => {
                attempt += 1;
                debug!(
                    "subtree lock contention, retry {}/{}",
                    attempt, config.move_retry_max
                );
                sleep(Duration::from_millis(
                    config.retry_backoff_ms * attempt as u64,
                ))
                .await;
            }
            result => return result,
        }
    }
}

/// Attach prefetched descendants to their root summaries. `descendants`
/// arrives ordered by path, so parents are seen before their children.
fn assemble_forest(
    roots: Vec<department::Model>,
    descendants: Vec<department::Model>,
) -> Vec<DepartmentNode> {
    use std::collections::HashMap;

    let mut by_parent: HashMap<String, Vec<DepartmentNode>> = HashMap::new();
    for model in descendants {
        let parent_path = match model.path.rsplit_once(PATH_SEPARATOR) {
            Some((parent, _leaf)) => parent.to_string(),
            None => continue,
        };
        by_parent
            .entry(parent_path)
            .or_default()
            .push(DepartmentNode::from(model));
    }

    let mut forest: Vec<DepartmentNode> = roots.into_iter().map(DepartmentNode::from).collect();
    for node in forest.iter_mut() {
        attach_children(node, &mut by_parent);
    }
    forest
}

fn attach_children(
    node: &mut DepartmentNode,
    by_parent: &mut std::collections::HashMap<String, Vec<DepartmentNode>>,
) {
    if let Some(mut children) = by_parent.remove(&node.path) {
        children.sort_by(|a, b| a.name.cmp(&b.name));
        node.children = children;
        for child in node.children.iter_mut() {
            attach_children(child, by_parent);
        }
    }
}
