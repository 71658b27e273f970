//! Handler模块

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::errors::AppError;
use common::models::{ActionRequest, ActionResult};
use common::response::ApiResponse;

use crate::service::{ActionExecutorTrait, ActionService};
use crate::state::AppState;

const SERVICE: &str = "executor-service";

/// 执行数据库动作
#[utoipa::path(
    post,
    path = "/api/actions",
    tag = "actions",
    request_body = ActionRequest,
    responses(
        (status = 200, description = "动作执行结果", body = ApiResponse<ActionResult>),
        (status = 401, description = "凭证无效或已吊销"),
        (status = 404, description = "数据不存在"),
        (status = 503, description = "后端不可达")
    )
)]
pub async fn invoke_action(
    State(state): State<AppState>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<ApiResponse<ActionResult>>, AppError> {
    let service = ActionService::new(state.config);
    let data = service.execute(req).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE)))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
}
