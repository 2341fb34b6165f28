//! Department tree engine
//!
//! Computes the structural effects of create, move and deactivate without
//! touching the database itself: planners work on snapshots the store
//! produced under its subtree lock, and return the row updates the service
//! persists atomically. Keeping the planners pure makes every invariant
//! (path prefix, depth, cycle rejection, idempotence) testable in isolation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entity::department;
use crate::error::{HierarchyError, HierarchyResult};
use crate::path::TreePath;
use crate::store::{HierarchyStore, LockedNode, PathRewrite};

/// Soft-delete cascade plan for one subtree
#[derive(Clone, Debug)]
pub struct DeactivationPlan {
    /// Departments that transition to inactive, root first
    pub affected: Vec<Uuid>,
    pub deleted_at: DateTime<Utc>,
}

impl DeactivationPlan {
    pub fn is_empty(&self) -> bool {
        self.affected.is_empty()
    }
}

/// Build the department a create command describes.
/// The caller resolves the parent row; persistence stays with the service.
pub fn plan_create(
    parent: Option<&department::Model>,
    id: Uuid,
    name: &str,
    identifier: &str,
    now: DateTime<Utc>,
) -> HierarchyResult<department::Model> {
    let path = match parent {
        Some(parent) => {
            if !parent.is_active {
                return Err(HierarchyError::InactiveParent(parent.id.to_string()));
            }
            TreePath::decode(&parent.path)?.child_of(id)
        }
        None => TreePath::root_of(id),
    };

    Ok(department::Model {
        id,
        name: name.to_string(),
        identifier: identifier.to_string(),
        parent_id: parent.map(|p| p.id),
        depth: path.depth(),
        path: path.to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

/// Compute the path/depth rewrites that move a locked subtree under a new
/// parent (or to the root level). Returns an empty set for a no-op move.
pub fn plan_move(
    locked: &[LockedNode],
    node_id: Uuid,
    new_parent: Option<&department::Model>,
) -> HierarchyResult<Vec<PathRewrite>> {
    let node = locked
        .iter()
        .find(|n| n.id == node_id)
        .ok_or_else(|| HierarchyError::NotFound(node_id.to_string()))?;
    if !node.is_active {
        return Err(HierarchyError::InactiveParent(node_id.to_string()));
    }

    let new_parent_path = match new_parent {
        Some(parent) => {
            if parent.id == node_id {
                return Err(HierarchyError::CyclicMove(format!(
                    "{} cannot become its own parent",
                    node_id
                )));
            }
            if !parent.is_active {
                return Err(HierarchyError::InactiveParent(parent.id.to_string()));
            }
            let parent_path = TreePath::decode(&parent.path)?;
            if parent_path.is_descendant_of(&node.path) {
                return Err(HierarchyError::CyclicMove(format!(
                    "{} is a descendant of {}",
                    parent.id, node_id
                )));
            }
            Some(parent_path)
        }
        None => None,
    };

    // Moving to the current parent (including root staying root) is a no-op
    if node.path.parent() == new_parent_path {
        return Ok(Vec::new());
    }

    let old_prefix = node.path.clone();
    let new_prefix = match &new_parent_path {
        Some(parent_path) => parent_path.child_of(node_id),
        None => TreePath::root_of(node_id),
    };

    let mut rewrites = Vec::with_capacity(locked.len());
    for entry in locked {
        let new_path = entry.path.rebase(&old_prefix, &new_prefix)?;
        rewrites.push(PathRewrite {
            id: entry.id,
            new_depth: new_path.depth(),
            new_path,
        });
    }
    Ok(rewrites)
}

/// Collect the still-active nodes of a locked subtree.
/// Already-inactive nodes are skipped, which makes deactivation idempotent.
pub fn plan_deactivate(locked: &[LockedNode], now: DateTime<Utc>) -> DeactivationPlan {
    DeactivationPlan {
        affected: locked.iter().filter(|n| n.is_active).map(|n| n.id).collect(),
        deleted_at: now,
    }
}

/// Lock the subtree and compute the move rewrites.
/// Persisting the rewrites (and committing) stays with the caller.
pub async fn move_subtree(
    store: &dyn HierarchyStore,
    node_id: Uuid,
    new_parent_id: Option<Uuid>,
) -> HierarchyResult<Vec<PathRewrite>> {
    let new_parent = match new_parent_id {
        Some(parent_id) if parent_id == node_id => {
            return Err(HierarchyError::CyclicMove(format!(
                "{} cannot become its own parent",
                node_id
            )));
        }
        Some(parent_id) => Some(
            store
                .get_by_id(parent_id)
                .await?
                .ok_or_else(|| HierarchyError::NotFound(parent_id.to_string()))?,
        ),
        None => None,
    };

    let locked = store.lock_subtree(node_id).await?;
    plan_move(&locked, node_id, new_parent.as_ref())
}

/// Lock the subtree and compute the deactivation cascade plan.
pub async fn deactivate_subtree(
    store: &dyn HierarchyStore,
    node_id: Uuid,
    now: DateTime<Utc>,
) -> HierarchyResult<DeactivationPlan> {
    let locked = store.lock_subtree(node_id).await?;
    Ok(plan_deactivate(&locked, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::MemoryHierarchyStore;

    fn fixture_now() -> DateTime<Utc> {
        "2026-01-15T12:00:00Z".parse().unwrap()
    }

    fn make_dept(parent: Option<&department::Model>, name: &str) -> department::Model {
        plan_create(parent, Uuid::new_v4(), name, name, fixture_now()).unwrap()
    }

    /// Root a -> child b -> grandchild c, all seeded into the store
    fn seeded_chain(store: &MemoryHierarchyStore) -> (department::Model, department::Model, department::Model) {
        let a = make_dept(None, "a");
        let b = make_dept(Some(&a), "b");
        let c = make_dept(Some(&b), "c");
        store.seed(a.clone());
        store.seed(b.clone());
        store.seed(c.clone());
        (a, b, c)
    }

    #[test]
    fn test_create_derives_path_and_depth() {
        let root = make_dept(None, "hq");
        assert_eq!(root.path, root.id.to_string());
        assert_eq!(root.depth, 0);
        assert!(root.parent_id.is_none());
        assert!(root.is_active);

        let child = make_dept(Some(&root), "ops");
        assert_eq!(child.path, format!("{}.{}", root.path, child.id));
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_id, Some(root.id));
    }

    #[test]
    fn test_create_rejects_inactive_parent() {
        let mut root = make_dept(None, "hq");
        root.is_active = false;
        let result = plan_create(Some(&root), Uuid::new_v4(), "ops", "ops", fixture_now());
        assert!(matches!(result, Err(HierarchyError::InactiveParent(_))));
    }

    #[tokio::test]
    async fn test_move_to_root_rewrites_subtree() {
        let store = MemoryHierarchyStore::new();
        let (a, b, c) = seeded_chain(&store);

        let rewrites = move_subtree(&store, b.id, None).await.unwrap();
        assert_eq!(rewrites.len(), 2);
        store.rewrite_paths(&rewrites).await.unwrap();

        let moved_b = store.get(b.id).unwrap();
        assert_eq!(moved_b.path, b.id.to_string());
        assert_eq!(moved_b.depth, 0);

        let moved_c = store.get(c.id).unwrap();
        assert_eq!(moved_c.path, format!("{}.{}", b.id, c.id));
        assert_eq!(moved_c.depth, 1);

        // The old ancestor keeps its own row untouched
        let untouched_a = store.get(a.id).unwrap();
        assert_eq!(untouched_a.path, a.id.to_string());
        assert_eq!(untouched_a.depth, 0);
    }

    #[tokio::test]
    async fn test_move_to_current_parent_is_noop() {
        let store = MemoryHierarchyStore::new();
        let (a, b, _c) = seeded_chain(&store);

        let rewrites = move_subtree(&store, b.id, Some(a.id)).await.unwrap();
        assert!(rewrites.is_empty());

        store.release_locks();

        // A root staying a root is equally a no-op
        let rewrites = move_subtree(&store, a.id, None).await.unwrap();
        assert!(rewrites.is_empty());
    }

    #[tokio::test]
    async fn test_move_under_descendant_is_cyclic() {
        let store = MemoryHierarchyStore::new();
        let (a, _b, c) = seeded_chain(&store);

        let result = move_subtree(&store, a.id, Some(c.id)).await;
        assert!(matches!(result, Err(HierarchyError::CyclicMove(_))));

        // Nothing was rewritten
        assert_eq!(store.get(a.id).unwrap().path, a.id.to_string());
        assert_eq!(store.get(c.id).unwrap().path, c.path);
    }

    #[tokio::test]
    async fn test_self_move_is_cyclic() {
        let store = MemoryHierarchyStore::new();
        let (a, _b, _c) = seeded_chain(&store);

        let result = move_subtree(&store, a.id, Some(a.id)).await;
        assert!(matches!(result, Err(HierarchyError::CyclicMove(_))));
    }

    #[tokio::test]
    async fn test_move_missing_node_or_parent() {
        let store = MemoryHierarchyStore::new();
        let (_a, b, _c) = seeded_chain(&store);

        let result = move_subtree(&store, Uuid::new_v4(), None).await;
        assert!(matches!(result, Err(HierarchyError::NotFound(_))));

        store.release_locks();

        let result = move_subtree(&store, b.id, Some(Uuid::new_v4())).await;
        assert!(matches!(result, Err(HierarchyError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_move_into_inactive_parent_rejected() {
        let store = MemoryHierarchyStore::new();
        let (a, _b, _c) = seeded_chain(&store);
        let other = make_dept(None, "other");
        store.seed(other.clone());

        store
            .mark_inactive(&[other.id], fixture_now())
            .await
            .unwrap();

        let result = move_subtree(&store, a.id, Some(other.id)).await;
        assert!(matches!(result, Err(HierarchyError::InactiveParent(_))));
    }

    #[tokio::test]
    async fn test_leaf_move_produces_single_rewrite() {
        let store = MemoryHierarchyStore::new();
        let (a, _b, c) = seeded_chain(&store);

        let rewrites = move_subtree(&store, c.id, Some(a.id)).await.unwrap();
        assert_eq!(rewrites.len(), 1);
        assert_eq!(rewrites[0].id, c.id);
        assert_eq!(rewrites[0].new_path.to_string(), format!("{}.{}", a.id, c.id));
        assert_eq!(rewrites[0].new_depth, 1);
    }

    #[tokio::test]
    async fn test_depth_matches_path_for_every_rewrite() {
        let store = MemoryHierarchyStore::new();
        let (a, b, _c) = seeded_chain(&store);
        let d = make_dept(Some(&b), "d");
        store.seed(d);

        let other = make_dept(None, "other");
        store.seed(other.clone());

        let rewrites = move_subtree(&store, b.id, Some(other.id)).await.unwrap();
        assert_eq!(rewrites.len(), 3);
        for rewrite in &rewrites {
            assert_eq!(rewrite.new_depth, rewrite.new_path.depth());
            assert!(rewrite
                .new_path
                .is_descendant_of(&TreePath::decode(&other.path).unwrap()));
        }

        // The old root is gone from every rewritten path
        for rewrite in &rewrites {
            assert!(!rewrite
                .new_path
                .is_descendant_of(&TreePath::decode(&a.path).unwrap()));
        }
    }

    #[tokio::test]
    async fn test_deactivate_covers_subtree_and_is_idempotent() {
        let store = MemoryHierarchyStore::new();
        let (a, b, c) = seeded_chain(&store);

        let plan = deactivate_subtree(&store, a.id, fixture_now()).await.unwrap();
        assert_eq!(plan.affected.len(), 3);
        for id in [a.id, b.id, c.id] {
            assert!(plan.affected.contains(&id));
        }
        store.mark_inactive(&plan.affected, plan.deleted_at).await.unwrap();
        store.release_locks();

        for id in [a.id, b.id, c.id] {
            let row = store.get(id).unwrap();
            assert!(!row.is_active);
            assert_eq!(row.deleted_at, Some(fixture_now()));
        }

        // Second pass finds nothing left to deactivate
        let plan = deactivate_subtree(&store, a.id, fixture_now()).await.unwrap();
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_deactivate_skips_already_inactive_descendant() {
        let store = MemoryHierarchyStore::new();
        let (a, _b, c) = seeded_chain(&store);

        store.mark_inactive(&[c.id], fixture_now()).await.unwrap();

        let plan = deactivate_subtree(&store, a.id, fixture_now()).await.unwrap();
        assert_eq!(plan.affected.len(), 2);
        assert!(!plan.affected.contains(&c.id));
    }

    #[tokio::test]
    async fn test_concurrent_moves_serialize_on_subtree_lock() {
        let store = MemoryHierarchyStore::new();
        let (a, b, _c) = seeded_chain(&store);
        let other = make_dept(None, "other");
        store.seed(other.clone());

        // First mover holds the subtree lock
        let winner = move_subtree(&store, b.id, None).await.unwrap();
        assert!(!winner.is_empty());

        // Second mover loses the race and gets a retryable error
        let loser = move_subtree(&store, b.id, Some(other.id)).await;
        match loser {
            Err(err) => assert!(err.is_retryable()),
            Ok(_) => panic!("overlapping move must not proceed"),
        }

        // Winner commits; loser retries against fresh state and succeeds
        store.rewrite_paths(&winner).await.unwrap();
        store.release_locks();

        let retry = move_subtree(&store, b.id, Some(other.id)).await.unwrap();
        store.rewrite_paths(&retry).await.unwrap();

        let final_b = store.get(b.id).unwrap();
        assert_eq!(final_b.path, format!("{}.{}", other.id, b.id));
        assert_eq!(final_b.depth, 1);
        // One coherent linear history: first to root, then under "other"
        assert!(!final_b.path.starts_with(&a.id.to_string()));
    }

    #[tokio::test]
    async fn test_disjoint_subtrees_do_not_contend() {
        let store = MemoryHierarchyStore::new();
        let (_a, b, _c) = seeded_chain(&store);
        let x = make_dept(None, "x");
        let y = make_dept(Some(&x), "y");
        store.seed(x.clone());
        store.seed(y.clone());

        // Lock b's subtree, then move inside the unrelated x subtree
        let first = move_subtree(&store, b.id, None).await.unwrap();
        assert!(!first.is_empty());

        let second = move_subtree(&store, y.id, None).await.unwrap();
        assert_eq!(second.len(), 1);
    }
}
