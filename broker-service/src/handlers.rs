//! Handler模块

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use common::errors::AppError;
use common::models::{BindRequest, BrokerStatus, CredentialSet, RelationItem};
use common::response::ApiResponse;

use crate::service::{BrokerService, BrokerServiceTrait};
use crate::state::AppState;

const SERVICE: &str = "broker-service";

/// 列出所有活跃关系
#[utoipa::path(
    get,
    path = "/api/relations",
    tag = "relations",
    responses(
        (status = 200, description = "关系列表", body = ApiResponse<Vec<RelationItem>>)
    )
)]
pub async fn list_relations(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<RelationItem>>>, AppError> {
    let service = BrokerService::new(state.broker);
    let data = service.list().await;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE)))
}

/// 绑定新关系并签发凭证
#[utoipa::path(
    post,
    path = "/api/relations",
    tag = "relations",
    request_body = BindRequest,
    responses(
        (status = 200, description = "关系已绑定，返回凭证", body = ApiResponse<BindResponse>),
        (status = 400, description = "关系已存在或缺少数据库名称")
    )
)]
pub async fn bind_relation(
    State(state): State<AppState>,
    Json(req): Json<BindRequest>,
) -> Result<Json<ApiResponse<BindResponse>>, AppError> {
    let service = BrokerService::new(state.broker);
    let (relation, credentials) = service.bind(req).await?;
    Ok(Json(ApiResponse::ok_with_service(
        BindResponse {
            relation,
            credentials,
        },
        SERVICE,
    )))
}

/// 解绑关系并吊销凭证
#[utoipa::path(
    delete,
    path = "/api/relations/{id}",
    tag = "relations",
    params(
        ("id" = String, Path, description = "关系 ID")
    ),
    responses(
        (status = 200, description = "关系已解绑", body = ApiResponse<bool>),
        (status = 404, description = "关系未找到")
    )
)]
pub async fn unbind_relation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<bool>>, AppError> {
    let service = BrokerService::new(state.broker);
    service.unbind(&id).await?;
    Ok(Json(ApiResponse::ok_with_service(true, SERVICE)))
}

/// 获取关系的活跃凭证
#[utoipa::path(
    get,
    path = "/api/relations/{id}/credentials",
    tag = "relations",
    params(
        ("id" = String, Path, description = "关系 ID")
    ),
    responses(
        (status = 200, description = "关系凭证", body = ApiResponse<CredentialSet>),
        (status = 404, description = "关系未找到")
    )
)]
pub async fn get_credentials(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<CredentialSet>>, AppError> {
    let service = BrokerService::new(state.broker);
    let data = service.credentials(&id).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE)))
}

/// 设置数据库名称配置
#[utoipa::path(
    put,
    path = "/api/config",
    tag = "config",
    request_body = ConfigRequest,
    responses(
        (status = 200, description = "配置已更新", body = ApiResponse<bool>),
        (status = 400, description = "数据库名称非法")
    )
)]
pub async fn set_config(
    State(state): State<AppState>,
    Json(req): Json<ConfigRequest>,
) -> Result<Json<ApiResponse<bool>>, AppError> {
    let service = BrokerService::new(state.broker);
    service.set_database_name(req.database_name).await?;
    Ok(Json(ApiResponse::ok_with_service(true, SERVICE)))
}

/// 查询代理状态
#[utoipa::path(
    get,
    path = "/api/status",
    tag = "status",
    responses(
        (status = 200, description = "代理状态", body = ApiResponse<BrokerStatus>)
    )
)]
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<BrokerStatus>>, AppError> {
    let service = BrokerService::new(state.broker);
    let data = service.status().await;
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
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        relations: state.broker.relation_count().await,
    })
}

/// 内部端点，供其他服务查询关系信息（不含密码）
#[utoipa::path(
    get,
    path = "/internal/relations/{id}",
    tag = "internal",
    params(
        ("id" = String, Path, description = "关系 ID")
    ),
    responses(
        (status = 200, description = "关系信息", body = ApiResponse<RelationItem>),
        (status = 404, description = "关系未找到")
    )
)]
pub async fn get_relation_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RelationItem>>, AppError> {
    let service = BrokerService::new(state.broker);
    let data = service.get(&id).await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// 绑定响应：关系信息与完整凭证
#[derive(Serialize, ToSchema)]
pub struct BindResponse {
    /// 关系信息
    pub relation: RelationItem,
    /// 签发的凭证
    pub credentials: CredentialSet,
}

/// 配置请求体
#[derive(Deserialize, ToSchema)]
pub struct ConfigRequest {
    /// 数据库名称
    #[serde(rename = "database-name")]
    pub database_name: String,
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
    /// 活跃关系数
    pub relations: usize,
}
