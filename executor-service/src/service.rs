//! 动作执行服务模块

use async_trait::async_trait;
use validator::Validate;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::{ActionRequest, ActionResult};
use common::utils::IdentValidator;

use crate::backend;

/// 动作执行服务 Trait
#[async_trait]
pub trait ActionExecutorTrait: Send + Sync {
    /// 使用请求携带的凭证执行数据库动作
    async fn execute(&self, req: ActionRequest) -> AppResult<ActionResult>;
}

/// 数据库动作执行服务
pub struct ActionService {
    config: AppConfig,
}

impl ActionService {
    /// 创建新的动作执行服务实例
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// 请求一致性校验：数据库名必须合法且与凭证作用域一致
    fn validate(req: &ActionRequest) -> AppResult<()> {
        req.validate()?;
        IdentValidator::validate(&req.database_name)?;
        if req.credentials.database != req.database_name {
            return Err(AppError::Validation(format!(
                "credentials are scoped to {}, not {}",
                req.credentials.database, req.database_name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ActionExecutorTrait for ActionService {
    async fn execute(&self, req: ActionRequest) -> AppResult<ActionResult> {
        Self::validate(&req)?;

        tracing::info!(
            action = %req.action,
            backend = %req.backend,
            database = %req.database_name,
            username = %req.credentials.username,
            "executing action"
        );
        let result = backend::execute(&self.config, &req).await?;
        tracing::info!(action = %req.action, "action completed");
        Ok(result)
    }
}
