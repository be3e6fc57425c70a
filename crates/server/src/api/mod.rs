pub mod auth;
pub mod nodes;
pub mod owners;
pub mod vms;

use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::Error;
use serde::Serialize;
use tracing::error;

use crate::{app_state::AppState, middleware::auth_middleware};

/// API 错误响应
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// 领域错误到 HTTP 响应的映射
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::AuthRejected(_) => StatusCode::UNAUTHORIZED,
            Error::GatewayUnreachable(_) => StatusCode::BAD_GATEWAY,
            Error::ActionRejected(_) => StatusCode::FORBIDDEN,
            Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            Error::GatewayUnreachable(_) => {
                format!("{}。请稍后刷新，或尝试唤醒节点", self.0)
            }
            _ => self.0.to_string(),
        };

        if status.is_server_error() {
            error!("❌ 请求失败 ({}): {}", status, self.0);
        }

        let body = Json(ErrorResponse {
            error: self.0.code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// 所有 API 路由（统一入口）
pub fn api_routes(state: AppState) -> Router<AppState> {
    // 需要认证的路由
    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .nest("/nodes", nodes::node_routes().merge(vms::vm_routes()))
        .route("/owners", get(owners::list_owners))
        .route_layer(from_fn_with_state(state, auth_middleware));

    Router::new()
        // 不需要认证的路由
        .route("/auth/login", post(auth::login))
        .merge(protected)
}
