//! DepartmentLocation entity - 部门地点关联表
//!
//! 表名: org_department_location

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_department_location")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// 部门ID
    pub department_id: Uuid,

    /// 地点ID
    pub location_id: Uuid,

    /// 是否有效 (随部门软删除级联)
    pub is_active: bool,

    /// 创建时间
    pub created_at: DateTimeUtc,

    /// 删除时间
    #[sea_orm(nullable)]
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// 跨模块关系通过手动查询处理

impl ActiveModelBehavior for ActiveModel {}
