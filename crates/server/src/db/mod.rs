/// 数据库访问层
///
/// 仅在所有权账本使用数据库后端时启用

pub mod models;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::info;

/// 建立数据库连接 (SeaORM)
pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection, anyhow::Error> {
    info!("正在连接数据库: {}", database_url);

    let mut opt = ConnectOptions::new(database_url.to_string());
    opt.sqlx_logging(false);
    // 内存 SQLite 每个连接都是独立的数据库，只能保留一个连接
    if database_url.starts_with("sqlite::memory:") {
        opt.max_connections(1).min_connections(1);
    }

    let db = Database::connect(opt).await?;
    info!("数据库连接成功");

    Ok(db)
}

/// 创建账本表（已存在时跳过）
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), anyhow::Error> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let stmt = schema
        .create_table_from_entity(models::vm_owner::Entity)
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&stmt)).await?;

    info!("账本表 vm_owners 已就绪");
    Ok(())
}
