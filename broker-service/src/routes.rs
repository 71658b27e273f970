//! 代理服务路由模块

use axum::{
    routing::{delete, get, put},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// 创建关系管理路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/relations",
            get(handlers::list_relations).post(handlers::bind_relation),
        )
        .route("/api/relations/{id}", delete(handlers::unbind_relation))
        .route(
            "/api/relations/{id}/credentials",
            get(handlers::get_credentials),
        )
        .route("/api/config", put(handlers::set_config))
        .route("/api/status", get(handlers::get_status))
        .route("/api/health", get(handlers::health_check))
        .route("/internal/relations/{id}", get(handlers::get_relation_info))
}
