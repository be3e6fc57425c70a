/// 所有权账本查询接口

use axum::{extract::State, Json};

use super::ApiError;
use crate::app_state::AppState;
use crate::ledger::OwnershipRecord;

/// 当前全部使用者记录
///
/// GET /api/owners
pub async fn list_owners(
    State(state): State<AppState>,
) -> Result<Json<Vec<OwnershipRecord>>, ApiError> {
    Ok(Json(state.control().owners().await?))
}
