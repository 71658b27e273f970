//! 关系凭证代理服务模块

use std::sync::Arc;

use async_trait::async_trait;
use validator::Validate;

use common::errors::AppResult;
use common::models::{BindRequest, BrokerStatus, CredentialSet, RelationItem};

use crate::registry::RelationBroker;

/// 代理服务 Trait
#[async_trait]
pub trait BrokerServiceTrait: Send + Sync {
    /// 列出所有活跃关系
    async fn list(&self) -> Vec<RelationItem>;

    /// 绑定新关系并签发凭证
    async fn bind(&self, req: BindRequest) -> AppResult<(RelationItem, CredentialSet)>;

    /// 解绑关系并吊销凭证
    async fn unbind(&self, relation_id: &str) -> AppResult<()>;

    /// 获取关系的活跃凭证
    async fn credentials(&self, relation_id: &str) -> AppResult<CredentialSet>;

    /// 根据 ID 获取关系
    async fn get(&self, relation_id: &str) -> AppResult<RelationItem>;

    /// 设置数据库名称配置
    async fn set_database_name(&self, name: String) -> AppResult<()>;

    /// 查询代理状态
    async fn status(&self) -> BrokerStatus;
}

/// 关系凭证代理服务
pub struct BrokerService {
    broker: Arc<RelationBroker>,
}

impl BrokerService {
    /// 创建新的代理服务实例
    pub fn new(broker: Arc<RelationBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl BrokerServiceTrait for BrokerService {
    async fn list(&self) -> Vec<RelationItem> {
        self.broker.list().await
    }

    async fn bind(&self, req: BindRequest) -> AppResult<(RelationItem, CredentialSet)> {
        req.validate()?;
        self.broker.bind(req).await
    }

    async fn unbind(&self, relation_id: &str) -> AppResult<()> {
        self.broker.unbind(relation_id).await
    }

    async fn credentials(&self, relation_id: &str) -> AppResult<CredentialSet> {
        self.broker.get_credentials(relation_id).await
    }

    async fn get(&self, relation_id: &str) -> AppResult<RelationItem> {
        self.broker.get(relation_id).await
    }

    async fn set_database_name(&self, name: String) -> AppResult<()> {
        self.broker.set_database_name(name).await
    }

    async fn status(&self) -> BrokerStatus {
        self.broker.status().await
    }
}
