//! 关系凭证代理服务
//!
//! 为消费方应用与数据库后端之间的关系提供凭证代理功能，包括：
//! - 关系的绑定与解绑
//! - 每个关系独立的凭证签发与吊销
//! - 代理状态上报（blocked / waiting / active）

mod grants;
mod handlers;
mod registry;
mod routes;
mod service;
mod state;

use axum::{middleware, routing::get, Json, Router};
use common::config::{load_dotenv, AppConfig};
use common::middleware::request_id::request_id_middleware;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "broker-service";
const DEFAULT_PORT: u16 = 8081;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "凭证代理 API",
        version = "0.1.0",
        description = "关系凭证代理微服务"
    ),
    paths(
        handlers::list_relations,
        handlers::bind_relation,
        handlers::unbind_relation,
        handlers::get_credentials,
        handlers::set_config,
        handlers::get_status,
        handlers::health_check,
        handlers::get_relation_info,
    ),
    components(schemas(
        common::models::BindRequest,
        common::models::RelationItem,
        common::models::CredentialSet,
        common::models::BackendType,
        common::models::BrokerStatus,
        common::models::StatusKind,
        handlers::BindResponse,
        handlers::ConfigRequest,
        handlers::HealthResponse,
    )),
    tags(
        (name = "relations", description = "关系管理端点"),
        (name = "config", description = "配置端点"),
        (name = "status", description = "状态端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Load .env file (if present) before anything else
    load_dotenv();

    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置
    let mut config = AppConfig::load_with_service(SERVICE_NAME);
    config.port = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    // 创建应用状态（后端管理连接按需建立）
    let state = AppState::new(config.clone());

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr).await.expect("绑定地址失败");
    axum::serve(listener, app).await.expect("服务启动失败");
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
