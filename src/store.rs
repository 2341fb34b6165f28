//! Hierarchy persistence contract
//!
//! The engine talks to the database through the `HierarchyStore` trait:
//! point lookups, subtree range queries by path prefix, row-level subtree
//! locking and atomic multi-row path rewrites. `SeaOrmHierarchyStore` is the
//! PostgreSQL implementation; it is constructed over a connection or an open
//! transaction, and every lock it takes lives until that transaction ends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockBehavior, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::entity::department;
use crate::error::{HierarchyError, HierarchyResult, OptionExt};
use crate::path::{TreePath, PATH_SEPARATOR};

/// Snapshot of one row in a locked subtree, ordered by path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockedNode {
    pub id: Uuid,
    pub path: TreePath,
    pub depth: i32,
    pub is_active: bool,
}

/// One row of an atomic path/depth rewrite
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathRewrite {
    pub id: Uuid,
    pub new_path: TreePath,
    pub new_depth: i32,
}

/// Persistence operations the hierarchy engine requires
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> HierarchyResult<Option<department::Model>>;

    async fn insert(&self, dept: department::Model) -> HierarchyResult<()>;

    /// Write-lock the department and all of its descendants until the
    /// enclosing transaction ends. Bounded wait: contention surfaces as
    /// `HierarchyError::Concurrency` instead of blocking indefinitely.
    async fn lock_subtree(&self, root_id: Uuid) -> HierarchyResult<Vec<LockedNode>>;

    /// Apply all path/depth updates; partial application is never observable
    /// because the caller holds the enclosing transaction.
    async fn rewrite_paths(&self, updates: &[PathRewrite]) -> HierarchyResult<()>;

    async fn mark_inactive(&self, ids: &[Uuid], deleted_at: DateTime<Utc>) -> HierarchyResult<()>;

    async fn mark_active(&self, id: Uuid) -> HierarchyResult<()>;

    /// Direct children only (depth = parent depth + 1), ordered by name.
    /// Returns the page plus the total child count.
    async fn list_children(
        &self,
        parent: &department::Model,
        page: u64,
        page_size: u64,
    ) -> HierarchyResult<(Vec<department::Model>, u64)>;

    /// Depth-0 departments ordered by name, paginated with total count.
    async fn list_roots(
        &self,
        page: u64,
        page_size: u64,
    ) -> HierarchyResult<(Vec<department::Model>, u64)>;

    /// Descendants of the given roots down to `max_depth`, ordered by path.
    /// Serves the eager child prefetch of root listings in one range query.
    async fn list_subtree_to_depth(
        &self,
        roots: &[department::Model],
        max_depth: i32,
    ) -> HierarchyResult<Vec<department::Model>>;
}

/// SeaORM-backed store; `C` is a connection or an open transaction
pub struct SeaOrmHierarchyStore<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> SeaOrmHierarchyStore<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }
}

/// LIKE pattern matching every strict descendant of `path`.
/// Ids are UUIDs, so the pattern needs no escaping.
fn descendant_pattern(path: &str) -> String {
    format!("{}{}%", path, PATH_SEPARATOR)
}

/// PostgreSQL raises lock_not_available (55P03) when NOWAIT loses the race
fn map_lock_err(err: DbErr) -> HierarchyError {
    let msg = err.to_string();
    if msg.contains("55P03") || msg.contains("could not obtain lock") {
        HierarchyError::Concurrency(msg)
    } else {
        HierarchyError::Persistence(err)
    }
}

#[async_trait]
impl<'a, C: ConnectionTrait + Sync> HierarchyStore for SeaOrmHierarchyStore<'a, C> {
    async fn get_by_id(&self, id: Uuid) -> HierarchyResult<Option<department::Model>> {
        let dept = department::Entity::find_by_id(id).one(self.conn).await?;
        Ok(dept)
    }

    async fn insert(&self, dept: department::Model) -> HierarchyResult<()> {
        let active = department::ActiveModel {
            id: Set(dept.id),
            name: Set(dept.name),
            identifier: Set(dept.identifier),
            parent_id: Set(dept.parent_id),
            path: Set(dept.path),
            depth: Set(dept.depth),
            is_active: Set(dept.is_active),
            created_at: Set(dept.created_at),
            updated_at: Set(dept.updated_at),
            deleted_at: Set(dept.deleted_at),
        };
        active.insert(self.conn).await?;
        Ok(())
    }

    async fn lock_subtree(&self, root_id: Uuid) -> HierarchyResult<Vec<LockedNode>> {
        // Lock the root row first so its path cannot shift under the
        // prefix query below.
        let root = department::Entity::find_by_id(root_id)
            .lock_with_behavior(LockType::Update, LockBehavior::Nowait)
            .one(self.conn)
            .await
            .map_err(map_lock_err)?
            .ok_or_not_found(root_id.to_string())?;

        let rows = department::Entity::find()
            .filter(
                Condition::any()
                    .add(department::Column::Path.eq(root.path.as_str()))
                    .add(department::Column::Path.like(&descendant_pattern(&root.path))),
            )
            .order_by_asc(department::Column::Path)
            .lock_with_behavior(LockType::Update, LockBehavior::Nowait)
            .all(self.conn)
            .await
            .map_err(map_lock_err)?;

        let mut locked = Vec::with_capacity(rows.len());
        for row in rows {
            locked.push(LockedNode {
                id: row.id,
                path: TreePath::decode(&row.path)?,
                depth: row.depth,
                is_active: row.is_active,
            });
        }
        Ok(locked)
    }

    async fn rewrite_paths(&self, updates: &[PathRewrite]) -> HierarchyResult<()> {
        let now = Utc::now();
        for update in updates {
            department::Entity::update_many()
                .col_expr(department::Column::Path, Expr::value(update.new_path.to_string()))
                .col_expr(department::Column::Depth, Expr::value(update.new_depth))
                .col_expr(department::Column::UpdatedAt, Expr::value(now))
                .filter(department::Column::Id.eq(update.id))
                .exec(self.conn)
                .await?;
        }
        Ok(())
    }

    async fn mark_inactive(&self, ids: &[Uuid], deleted_at: DateTime<Utc>) -> HierarchyResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        department::Entity::update_many()
            .col_expr(department::Column::IsActive, Expr::value(false))
            .col_expr(department::Column::DeletedAt, Expr::value(Some(deleted_at)))
            .col_expr(department::Column::UpdatedAt, Expr::value(deleted_at))
            .filter(department::Column::Id.is_in(ids.iter().copied()))
            .exec(self.conn)
            .await?;
        Ok(())
    }

    async fn mark_active(&self, id: Uuid) -> HierarchyResult<()> {
        department::Entity::update_many()
            .col_expr(department::Column::IsActive, Expr::value(true))
            .col_expr(
                department::Column::DeletedAt,
                Expr::value(None::<DateTime<Utc>>),
            )
            .col_expr(department::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(department::Column::Id.eq(id))
            .exec(self.conn)
            .await?;
        Ok(())
    }

    async fn list_children(
        &self,
        parent: &department::Model,
        page: u64,
        page_size: u64,
    ) -> HierarchyResult<(Vec<department::Model>, u64)> {
        let paginator = department::Entity::find()
            .filter(department::Column::Path.like(&descendant_pattern(&parent.path)))
            .filter(department::Column::Depth.eq(parent.depth + 1))
            .order_by_asc(department::Column::Name)
            .paginate(self.conn, page_size);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    async fn list_roots(
        &self,
        page: u64,
        page_size: u64,
    ) -> HierarchyResult<(Vec<department::Model>, u64)> {
        let paginator = department::Entity::find()
            .filter(department::Column::Depth.eq(0))
            .order_by_asc(department::Column::Name)
            .paginate(self.conn, page_size);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    async fn list_subtree_to_depth(
        &self,
        roots: &[department::Model],
        max_depth: i32,
    ) -> HierarchyResult<Vec<department::Model>> {
        if roots.is_empty() {
            return Ok(Vec::new());
        }

        let mut prefix_cond = Condition::any();
        for root in roots {
            prefix_cond =
                prefix_cond.add(department::Column::Path.like(&descendant_pattern(&root.path)));
        }

        let rows = department::Entity::find()
            .filter(prefix_cond)
            .filter(department::Column::Depth.lte(max_depth))
            .order_by_asc(department::Column::Path)
            .all(self.conn)
            .await?;
        Ok(rows)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descendant_pattern() {
        assert_eq!(descendant_pattern("A.B"), "A.B.%");
    }

    #[test]
    fn test_map_lock_err_detects_contention() {
        let err = DbErr::Custom("55P03: could not obtain lock on row".to_string());
        assert!(matches!(map_lock_err(err), HierarchyError::Concurrency(_)));

        let err = DbErr::Custom("syntax error".to_string());
        assert!(matches!(map_lock_err(err), HierarchyError::Persistence(_)));
    }
}
