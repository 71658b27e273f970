//! 执行服务路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// 创建动作执行路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/actions", post(handlers::invoke_action))
        .route("/api/health", get(handlers::health_check))
}
