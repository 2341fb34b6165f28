//! Entity module - SeaORM 实体定义
//!
//! 包含所有数据库表对应的实体模型

pub mod department;
pub mod department_location;
pub mod department_position;
pub mod location;
pub mod position;
