/// 登录与会话接口

use axum::{extract::State, Extension, Json};
use common::Error;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ApiError;
use crate::app_state::AppState;
use crate::auth::CurrentSession;
use crate::services::LoginResult;

/// 登录请求
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(max = 256, message = "用户名过长"))]
    pub username: String,
    #[validate(length(max = 1024, message = "密码过长"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// 用户登录
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResult>, ApiError> {
    req.validate()
        .map_err(|e| Error::InvalidArgument(e.to_string()))?;

    let result = state.auth().login(req.username.trim(), &req.password).await?;
    Ok(Json(result))
}

/// 注销当前会话
///
/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
) -> Json<LogoutResponse> {
    state.auth().logout(&session).await;
    Json(LogoutResponse { success: true })
}

/// GET /api/auth/me
pub async fn me(Extension(session): Extension<CurrentSession>) -> Json<MeResponse> {
    Json(MeResponse {
        username: session.username,
    })
}
