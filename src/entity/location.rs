//! Location entity - 办公地点表
//!
//! 表名: org_location

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_location")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// 地点名称
    #[sea_orm(column_type = "String(Some(64))")]
    pub name: String,

    /// 地址
    #[sea_orm(column_type = "String(Some(256))", nullable)]
    pub address: Option<String>,

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

// 跨模块关系通过手动查询处理

impl ActiveModelBehavior for ActiveModel {}
