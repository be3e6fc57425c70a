/// Amembo VM Controller - Server
///
/// 通过 Proxmox API 控制虚拟机电源，LDAP 登录，记录每台虚拟机的使用者

mod api;
mod app_state;
mod auth;
mod config;
mod db;
mod hypervisor;
mod ledger;
mod middleware;
mod services;

use anyhow::Context;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    app_state::AppState,
    auth::{LdapConnector, SearchThenBind, SessionStore, TokenIssuer},
    config::{Config, LedgerBackend, LedgerConfig, DEFAULT_JWT_SECRET},
    db::{ensure_schema, establish_connection},
    hypervisor::ProxmoxClient,
    ledger::{DbOwnerStore, JsonFileStore, OwnerStore, OwnershipLedger},
    services::{AuthService, ControlService, NodeSettings},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenvy::dotenv().ok();

    // 加载配置
    let cfg = Config::load()?;

    // 初始化日志，RUST_LOG 优先于配置中的日志级别
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.server.log_level)),
        )
        .init();

    info!("🚀 启动 Amembo VM Controller...");
    info!("✅ 配置加载成功");
    if cfg.server.jwt_secret == DEFAULT_JWT_SECRET {
        warn!("⚠️  正在使用默认的 JWT 密钥，请在生产环境中修改 server.jwt_secret");
    }

    // 所有权账本
    let ledger = OwnershipLedger::new(open_owner_store(&cfg.ledger).await?);
    info!("✅ 所有权账本已就绪 (后端: {})", ledger.backend());

    // 虚拟化平台
    let proxmox = ProxmoxClient::new(&cfg.proxmox).context("初始化 Proxmox 客户端失败")?;
    info!("✅ Proxmox API: {}", proxmox.base_url());
    let control = ControlService::new(
        Arc::new(proxmox),
        ledger,
        NodeSettings::from(&cfg.proxmox),
    );

    // 目录服务与会话
    let directory = SearchThenBind::new(LdapConnector::new(&cfg.ldap));
    info!("✅ LDAP 目录: {}", cfg.ldap.url);
    let auth = AuthService::new(
        Arc::new(directory),
        TokenIssuer::new(&cfg.server.jwt_secret, cfg.server.session_ttl_hours),
        SessionStore::new(),
        cfg.ldap.provision_home,
    );

    // 创建应用状态
    let app_state = AppState::new(control, auth);

    // 设置CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 构建应用路由
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .nest("/api", api::api_routes(app_state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // 启动服务器
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    info!("🎯 服务器监听在 http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// 按配置选择账本存储
async fn open_owner_store(cfg: &LedgerConfig) -> anyhow::Result<Arc<dyn OwnerStore>> {
    match cfg.backend {
        LedgerBackend::File => {
            let store = JsonFileStore::new(cfg.path.clone());
            info!("📒 账本文件: {}", store.path().display());
            Ok(Arc::new(store))
        }
        LedgerBackend::Database => {
            let url = cfg
                .database_url
                .as_deref()
                .context("ledger.database_url 未配置")?;
            let db = establish_connection(url)
                .await
                .context("账本数据库连接失败")?;
            ensure_schema(&db).await?;
            info!("✅ 账本数据库连接成功");
            Ok(Arc::new(DbOwnerStore::new(db)))
        }
    }
}

async fn root_handler() -> &'static str {
    "Amembo VM Controller API v1"
}

async fn health_handler() -> &'static str {
    "OK"
}
