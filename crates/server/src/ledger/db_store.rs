/// 数据库所有权存储 (SeaORM)
///
/// 单条记录的增删由数据库保证原子性，可以在多实例部署时替代 JSON 文件。

use async_trait::async_trait;
use chrono::Utc;
use common::{Error, Result};
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use std::collections::BTreeMap;

use super::store::OwnerStore;
use crate::db::models::vm_owner::{
    ActiveModel as VmOwnerActiveModel, Column as VmOwnerColumn, Entity as VmOwnerEntity,
};

pub struct DbOwnerStore {
    db: DatabaseConnection,
}

impl DbOwnerStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn db_error(e: sea_orm::DbErr) -> Error {
    Error::Persistence(e.to_string())
}

#[async_trait]
impl OwnerStore for DbOwnerStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let record = VmOwnerEntity::find_by_id(key.to_string())
            .one(&self.db)
            .await
            .map_err(db_error)?;
        Ok(record.map(|r| r.owner))
    }

    async fn put(&self, key: &str, owner: &str) -> Result<()> {
        let active = VmOwnerActiveModel {
            key: Set(key.to_string()),
            owner: Set(owner.to_string()),
            claimed_at: Set(Utc::now().into()),
        };

        VmOwnerEntity::insert(active)
            .on_conflict(
                OnConflict::column(VmOwnerColumn::Key)
                    .update_columns([VmOwnerColumn::Owner, VmOwnerColumn::ClaimedAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let result = VmOwnerEntity::delete_by_id(key.to_string())
            .exec(&self.db)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected > 0)
    }

    async fn entries(&self) -> Result<BTreeMap<String, String>> {
        let records = VmOwnerEntity::find().all(&self.db).await.map_err(db_error)?;
        Ok(records.into_iter().map(|r| (r.key, r.owner)).collect())
    }

    fn backend(&self) -> &str {
        "database"
    }
}
