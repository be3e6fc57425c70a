/// 认证中间件
///
/// 读取 `Authorization: Bearer <jwt>`，校验签名并确认服务端会话仍然有效，
/// 然后把 `CurrentSession` 放入请求扩展。

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use common::Error;
use tracing::debug;

use crate::api::ApiError;
use crate::app_state::AppState;

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::AuthRejected("缺少认证令牌".to_string()))?;

    let session = state.auth().authenticate_token(token).await?;
    debug!("请求 {} 来自用户 {}", req.uri().path(), session.username);

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}
