//! Soft-delete cascade for department associations
//!
//! When a subtree of departments is deactivated, every Location/Position
//! join row owned by an affected department is soft-deleted in the same
//! transaction. An aggregate that loses its last active association is
//! soft-deleted too (the orphan check); aggregates still reachable through
//! another active department are left alone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
};
use uuid::Uuid;

use crate::entity::{department_location, department_position, location, position};
use crate::error::HierarchyResult;

/// Association-side operations the cascade needs from each aggregate
#[async_trait]
pub trait AssociationRepository: Send + Sync {
    /// Soft-delete the active join rows owned by the given departments.
    /// Returns the ids of the aggregates whose rows were touched.
    async fn soft_delete_for_departments(
        &self,
        department_ids: &[Uuid],
        deleted_at: DateTime<Utc>,
    ) -> HierarchyResult<Vec<Uuid>>;

    /// Orphan check: does the aggregate still have any active association?
    async fn has_active_associations(&self, aggregate_id: Uuid) -> HierarchyResult<bool>;

    async fn soft_delete_aggregate(
        &self,
        aggregate_id: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> HierarchyResult<()>;
}

/// Location side of the cascade
pub struct LocationAssociations<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> LocationAssociations<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<'a, C: ConnectionTrait + Sync> AssociationRepository for LocationAssociations<'a, C> {
    async fn soft_delete_for_departments(
        &self,
        department_ids: &[Uuid],
        deleted_at: DateTime<Utc>,
    ) -> HierarchyResult<Vec<Uuid>> {
        if department_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = department_location::Entity::find()
            .filter(department_location::Column::DepartmentId.is_in(department_ids.iter().copied()))
            .filter(department_location::Column::IsActive.eq(true))
            .all(self.conn)
            .await?;

        let mut touched: Vec<Uuid> = rows.iter().map(|r| r.location_id).collect();
        touched.sort();
        touched.dedup();

        department_location::Entity::update_many()
            .col_expr(department_location::Column::IsActive, Expr::value(false))
            .col_expr(
                department_location::Column::DeletedAt,
                Expr::value(Some(deleted_at)),
            )
            .filter(department_location::Column::DepartmentId.is_in(department_ids.iter().copied()))
            .filter(department_location::Column::IsActive.eq(true))
            .exec(self.conn)
            .await?;

        Ok(touched)
    }

    async fn has_active_associations(&self, aggregate_id: Uuid) -> HierarchyResult<bool> {
        let count = department_location::Entity::find()
            .filter(department_location::Column::LocationId.eq(aggregate_id))
            .filter(department_location::Column::IsActive.eq(true))
            .count(self.conn)
            .await?;
        Ok(count > 0)
    }

    async fn soft_delete_aggregate(
        &self,
        aggregate_id: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> HierarchyResult<()> {
        location::Entity::update_many()
            .col_expr(location::Column::IsActive, Expr::value(false))
            .col_expr(location::Column::DeletedAt, Expr::value(Some(deleted_at)))
            .col_expr(location::Column::UpdatedAt, Expr::value(deleted_at))
            .filter(location::Column::Id.eq(aggregate_id))
            .exec(self.conn)
            .await?;
        Ok(())
    }
}

/// Position side of the cascade
pub struct PositionAssociations<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> PositionAssociations<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<'a, C: ConnectionTrait + Sync> AssociationRepository for PositionAssociations<'a, C> {
    async fn soft_delete_for_departments(
        &self,
        department_ids: &[Uuid],
        deleted_at: DateTime<Utc>,
    ) -> HierarchyResult<Vec<Uuid>> {
        if department_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = department_position::Entity::find()
            .filter(department_position::Column::DepartmentId.is_in(department_ids.iter().copied()))
            .filter(department_position::Column::IsActive.eq(true))
            .all(self.conn)
            .await?;

        let mut touched: Vec<Uuid> = rows.iter().map(|r| r.position_id).collect();
        touched.sort();
        touched.dedup();

        department_position::Entity::update_many()
            .col_expr(department_position::Column::IsActive, Expr::value(false))
            .col_expr(
                department_position::Column::DeletedAt,
                Expr::value(Some(deleted_at)),
            )
            .filter(department_position::Column::DepartmentId.is_in(department_ids.iter().copied()))
            .filter(department_position::Column::IsActive.eq(true))
            .exec(self.conn)
            .await?;

        Ok(touched)
    }

    async fn has_active_associations(&self, aggregate_id: Uuid) -> HierarchyResult<bool> {
        let count = department_position::Entity::find()
            .filter(department_position::Column::PositionId.eq(aggregate_id))
            .filter(department_position::Column::IsActive.eq(true))
            .count(self.conn)
            .await?;
        Ok(count > 0)
    }

    async fn soft_delete_aggregate(
        &self,
        aggregate_id: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> HierarchyResult<()> {
        position::Entity::update_many()
            .col_expr(position::Column::IsActive, Expr::value(false))
            .col_expr(position::Column::DeletedAt, Expr::value(Some(deleted_at)))
            .col_expr(position::Column::UpdatedAt, Expr::value(deleted_at))
            .filter(position::Column::Id.eq(aggregate_id))
            .exec(self.conn)
            .await?;
        Ok(())
    }
}

/// What a cascade pass soft-deleted beyond the join rows
#[derive(Clone, Debug, Default)]
pub struct CascadeOutcome {
    pub orphaned_locations: Vec<Uuid>,
    pub orphaned_positions: Vec<Uuid>,
}

/// Applies the association cascade for a set of deactivated departments.
/// Runs inside the caller's transaction: the structural change and the
/// cascade commit together or not at all.
pub struct CascadeCoordinator<L, P> {
    locations: L,
    positions: P,
}

impl<L: AssociationRepository, P: AssociationRepository> CascadeCoordinator<L, P> {
    pub fn new(locations: L, positions: P) -> Self {
        Self { locations, positions }
    }

    pub async fn apply(
        &self,
        department_ids: &[Uuid],
        deleted_at: DateTime<Utc>,
    ) -> HierarchyResult<CascadeOutcome> {
        if department_ids.is_empty() {
            return Ok(CascadeOutcome::default());
        }

        let orphaned_locations =
            apply_side(&self.locations, department_ids, deleted_at).await?;
        let orphaned_positions =
            apply_side(&self.positions, department_ids, deleted_at).await?;

        if !orphaned_locations.is_empty() || !orphaned_positions.is_empty() {
            tracing::debug!(
                "cascade orphaned {} locations, {} positions",
                orphaned_locations.len(),
                orphaned_positions.len()
            );
        }

        Ok(CascadeOutcome {
            orphaned_locations,
            orphaned_positions,
        })
    }
}

async fn apply_side(
    repo: &dyn AssociationRepository,
    department_ids: &[Uuid],
    deleted_at: DateTime<Utc>,
) -> HierarchyResult<Vec<Uuid>> {
    let touched = repo
        .soft_delete_for_departments(department_ids, deleted_at)
        .await?;

    let mut orphaned = Vec::new();
    for aggregate_id in touched {
        if !repo.has_active_associations(aggregate_id).await? {
            repo.soft_delete_aggregate(aggregate_id, deleted_at).await?;
            orphaned.push(aggregate_id);
        }
    }
    Ok(orphaned)
}
