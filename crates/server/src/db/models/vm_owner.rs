/// 虚拟机所有权数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 所有权记录：账本键 `<node>_<vmid>` -> 使用者
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vm_owners")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub owner: String,

    // 时间戳
    pub claimed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
