use crate::storage::entity::session_kv;
use log::info;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use std::time::Duration;

pub async fn establish_connection(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    if db_url.contains(":memory:") {
        // 内存库每个连接各自独立，只能用单连接
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(4)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(60))
            .max_lifetime(Duration::from_secs(600));
    }
    opt.connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Info);

    let db = Database::connect(opt).await?;

    // 启用 WAL 模式
    if db.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
        db.execute(sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Sqlite,
            "PRAGMA journal_mode=WAL;".to_string(),
        ))
        .await?;
    }

    // 创建表（如果不存在）
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let stmt = builder.build(
        schema
            .create_table_from_entity(session_kv::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    info!("Database connection established, session table initialized.");

    Ok(db)
}
