//! Department entity - 部门表
//!
//! 表名: org_department

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_department")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// 部门名称
    #[sea_orm(column_type = "String(Some(64))")]
    pub name: String,

    /// 部门标识
    #[sea_orm(column_type = "String(Some(64))")]
    pub identifier: String,

    /// 父部门ID (NULL 表示顶级部门)
    #[sea_orm(nullable)]
    pub parent_id: Option<Uuid>,

    /// 物化路径: 祖先ID链 (含自身), 以 "." 连接
    #[sea_orm(column_type = "Text")]
    pub path: String,

    /// 层级深度 (顶级部门为 0)
    pub depth: i32,

    /// 是否有效 (软删除标记)
    pub is_active: bool,

    /// 创建时间
    pub created_at: DateTimeUtc,

    /// 更新时间
    pub updated_at: DateTimeUtc,

    /// 删除时间
    #[sea_orm(nullable)]
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// 自引用和跨模块关系通过手动查询处理

impl ActiveModelBehavior for ActiveModel {}

/// 部门摘要 (用于分页列表)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DepartmentNode {
    pub id: Uuid,
    pub name: String,
    pub identifier: String,
    #[serde(rename = "parentId")]
    pub parent_id: Option<Uuid>,
    pub path: String,
    pub depth: i32,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DepartmentNode>,
}

impl From<Model> for DepartmentNode {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            identifier: model.identifier,
            parent_id: model.parent_id,
            path: model.path,
            depth: model.depth,
            is_active: model.is_active,
            children: Vec::new(),
        }
    }
}
