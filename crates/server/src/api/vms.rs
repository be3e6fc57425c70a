/// 虚拟机控制接口

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use common::VmControlState;
use serde::Serialize;
use std::net::Ipv4Addr;

use super::ApiError;
use crate::app_state::AppState;
use crate::auth::CurrentSession;
use crate::services::control_service::{ActionOutcome, VmPanel};

/// 控制操作响应
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    pub state: VmControlState,
}

impl From<ActionOutcome> for ActionResponse {
    fn from(outcome: ActionOutcome) -> Self {
        Self {
            success: true,
            message: outcome.message,
            state: outcome.state,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IpResponse {
    pub ip_addresses: Vec<Ipv4Addr>,
    /// Guest Agent 尚未上报地址
    pub pending: bool,
}

/// VM 路由（挂在 /nodes 下）
pub fn vm_routes() -> Router<AppState> {
    Router::new()
        .route("/:node/vms/:vmid", get(get_vm))
        .route("/:node/vms/:vmid/start", post(start_vm))
        .route("/:node/vms/:vmid/shutdown", post(shutdown_vm))
        .route("/:node/vms/:vmid/stop", post(stop_vm))
        .route("/:node/vms/:vmid/ip", get(refresh_ip))
}

/// 虚拟机面板
///
/// GET /api/nodes/:node/vms/:vmid
pub async fn get_vm(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Path((node, vmid)): Path<(String, u32)>,
) -> Result<Json<VmPanel>, ApiError> {
    let id = state.control().resolve_vm(&node, vmid).await?;
    let mut ctx = session.context.lock().await;
    Ok(Json(state.control().vm_panel(&id, &mut ctx).await?))
}

/// 启动虚拟机
///
/// POST /api/nodes/:node/vms/:vmid/start
pub async fn start_vm(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Path((node, vmid)): Path<(String, u32)>,
) -> Result<Json<ActionResponse>, ApiError> {
    let id = state.control().resolve_vm(&node, vmid).await?;
    let mut ctx = session.context.lock().await;
    let outcome = state.control().start(&id, &mut ctx).await?;
    Ok(Json(outcome.into()))
}

/// 发送关机信号
///
/// POST /api/nodes/:node/vms/:vmid/shutdown
pub async fn shutdown_vm(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Path((node, vmid)): Path<(String, u32)>,
) -> Result<Json<ActionResponse>, ApiError> {
    let id = state.control().resolve_vm(&node, vmid).await?;
    let mut ctx = session.context.lock().await;
    let outcome = state.control().shutdown(&id, &mut ctx).await?;
    Ok(Json(outcome.into()))
}

/// 强制停止
///
/// POST /api/nodes/:node/vms/:vmid/stop
pub async fn stop_vm(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Path((node, vmid)): Path<(String, u32)>,
) -> Result<Json<ActionResponse>, ApiError> {
    let id = state.control().resolve_vm(&node, vmid).await?;
    let mut ctx = session.context.lock().await;
    let outcome = state.control().force_stop(&id, &mut ctx).await?;
    Ok(Json(outcome.into()))
}

/// 刷新 IP
///
/// GET /api/nodes/:node/vms/:vmid/ip
pub async fn refresh_ip(
    State(state): State<AppState>,
    Path((node, vmid)): Path<(String, u32)>,
) -> Result<Json<IpResponse>, ApiError> {
    let id = state.control().resolve_vm(&node, vmid).await?;
    let ip_addresses = state.control().refresh_ip(&id).await;
    Ok(Json(IpResponse {
        pending: ip_addresses.is_empty(),
        ip_addresses,
    }))
}
