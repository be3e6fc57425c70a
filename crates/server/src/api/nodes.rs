/// 节点接口

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;

use super::ApiError;
use crate::app_state::AppState;
use crate::auth::CurrentSession;
use crate::services::control_service::{NodeListing, NodePanel};

#[derive(Debug, Serialize)]
pub struct WakeResponse {
    pub success: bool,
    pub message: String,
    pub relay: String,
    pub uncertain: bool,
}

/// 节点路由
pub fn node_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_nodes))
        .route("/:node/vms", get(node_panel))
        .route("/:node/wake", post(wake_node))
}

/// 获取节点列表
///
/// GET /api/nodes
pub async fn list_nodes(State(state): State<AppState>) -> Json<NodeListing> {
    Json(state.control().list_nodes().await)
}

/// 节点面板，节点离线时返回唤醒提示
///
/// GET /api/nodes/:node/vms
pub async fn node_panel(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Path(node): Path<String>,
) -> Result<Json<NodePanel>, ApiError> {
    let mut ctx = session.context.lock().await;
    let panel = state.control().node_panel(&node, &mut ctx).await?;
    Ok(Json(panel))
}

/// 唤醒节点
///
/// POST /api/nodes/:node/wake
pub async fn wake_node(
    State(state): State<AppState>,
    Path(node): Path<String>,
) -> Result<Json<WakeResponse>, ApiError> {
    let outcome = state.control().wake_node(&node).await?;
    Ok(Json(WakeResponse {
        success: true,
        message: outcome.message,
        relay: outcome.receipt.relay,
        uncertain: outcome.receipt.uncertain,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{login, send, test_app};
    use crate::hypervisor::fake::FakeHypervisor;
    use axum::http::{Method, StatusCode};

    fn cluster() -> FakeHypervisor {
        FakeHypervisor::new()
            .with_node("alpha", true)
            .with_node("beta", false)
            .with_node("amembonas", true)
            .with_vm("alpha", 100, "web", "running")
    }

    #[tokio::test]
    async fn test_list_and_panels() {
        let (app, fake) = test_app(cluster());
        let token = login(&app, "alice", "wonderland").await;

        let (status, body) = send(&app, Method::GET, "/api/nodes", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["api_reachable"], true);
        assert_eq!(body["nodes"].as_array().unwrap().len(), 2);

        let (_, body) = send(&app, Method::GET, "/api/nodes/alpha/vms", Some(&token), None).await;
        assert_eq!(body["status"], "online");
        assert_eq!(body["vms"][0]["label"], "100: web (running)");

        let (_, body) = send(&app, Method::GET, "/api/nodes/beta/vms", Some(&token), None).await;
        assert_eq!(body["status"], "offline");
        assert_eq!(body["actions"][0], "wake_node");
        assert_eq!(fake.count("list_vms beta"), 0);
    }

    #[tokio::test]
    async fn test_wake_node() {
        let (app, fake) = test_app(cluster());
        let token = login(&app, "alice", "wonderland").await;

        let (status, body) = send(&app, Method::POST, "/api/nodes/beta/wake", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["relay"], "alpha");
        assert_eq!(fake.count("wake alpha->beta"), 1);
    }

    #[tokio::test]
    async fn test_unknown_node_is_404() {
        let (app, _) = test_app(cluster());
        let token = login(&app, "alice", "wonderland").await;
        let (status, body) = send(&app, Method::GET, "/api/nodes/gamma/vms", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }
}
