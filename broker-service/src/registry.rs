//! Relation registry and credential issuance.
//!
//! Tracks active relations, mints a fresh credential set whenever a relation
//! is bound, and revokes the backend principal when the relation is removed.
//! Issued credential identities are remembered for the process lifetime so
//! that no two credential sets for the same database can ever be equal, not
//! even across sequential lifecycles of the same relation id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::{
    BackendType, BindRequest, BrokerStatus, CredentialSet, Relation, RelationItem, StatusKind,
};
use common::utils::{CredentialGenerator, IdentValidator};

use crate::grants::GrantBackend;

/// A bound relation with its active credential set.
#[derive(Clone)]
struct BoundRelation {
    relation: Relation,
    credentials: CredentialSet,
}

impl BoundRelation {
    fn item(&self) -> RelationItem {
        RelationItem {
            relation_id: self.relation.relation_id.clone(),
            consumer: self.relation.consumer.clone(),
            backend: self.relation.backend,
            database: self.relation.database.clone(),
            username: self.credentials.username.clone(),
            bound_at: self.relation.bound_at.clone(),
        }
    }
}

/// The relation credential broker.
///
/// All state transitions are driven by the orchestrator through discrete
/// bind/unbind/config events; a single write lock serializes bind and unbind
/// per process, which also serializes them per relation id.
pub struct RelationBroker {
    config: AppConfig,
    grants: Arc<dyn GrantBackend>,
    /// Active relations keyed by relation id.
    relations: RwLock<HashMap<String, BoundRelation>>,
    /// Every credential identity issued per database, for the process lifetime.
    issued: RwLock<HashMap<String, HashSet<(String, String)>>>,
    /// Credentials whose backend-side drop failed; retried on later operations.
    pending_revocations: RwLock<Vec<(BackendType, CredentialSet)>>,
    /// Database name from config-set; fallback for binds without one.
    database_name: RwLock<Option<String>>,
}

impl RelationBroker {
    /// Creates a new broker over the given grant backend.
    pub fn new(config: AppConfig, grants: Arc<dyn GrantBackend>) -> Self {
        let database_name = RwLock::new(config.database_name.clone());
        Self {
            config,
            grants,
            relations: RwLock::new(HashMap::new()),
            issued: RwLock::new(HashMap::new()),
            pending_revocations: RwLock::new(Vec::new()),
            database_name,
        }
    }

    /// Sets the configured database name (config-set event).
    pub async fn set_database_name(&self, name: String) -> AppResult<()> {
        IdentValidator::validate(&name)?;
        *self.database_name.write().await = Some(name.clone());
        tracing::info!(database = %name, "database-name configured");
        Ok(())
    }

    /// Returns the configured database name, if any.
    pub async fn database_name(&self) -> Option<String> {
        self.database_name.read().await.clone()
    }

    /// Binds a relation: mints a credential set and creates the backend
    /// principal. Fails if the relation id is already active.
    pub async fn bind(&self, req: BindRequest) -> AppResult<(RelationItem, CredentialSet)> {
        self.flush_pending_revocations().await;

        let database = match req.database.clone().or(self.database_name().await) {
            Some(db) => db,
            None => {
                return Err(AppError::Validation(
                    "database-name is not configured".into(),
                ))
            }
        };
        IdentValidator::validate(&database)?;

        let mut relations = self.relations.write().await;
        if relations.contains_key(&req.relation_id) {
            return Err(AppError::Validation(format!(
                "relation {} is already bound",
                req.relation_id
            )));
        }

        let credentials = self.issue(&database, req.backend).await?;

        // Data must outlive principals: the database is created once and
        // never dropped by revocation.
        self.grants.ensure_database(req.backend, &database).await?;
        self.grants
            .create_principal(req.backend, &credentials)
            .await?;

        let bound = BoundRelation {
            relation: Relation {
                relation_id: req.relation_id.clone(),
                consumer: req.consumer,
                backend: req.backend,
                database,
                bound_at: Utc::now().to_rfc3339(),
            },
            credentials: credentials.clone(),
        };
        let item = bound.item();
        relations.insert(req.relation_id.clone(), bound);

        tracing::info!(
            relation_id = %req.relation_id,
            backend = %req.backend,
            username = %credentials.username,
            "relation bound"
        );
        Ok((item, credentials))
    }

    /// Unbinds a relation and revokes its credential set.
    ///
    /// The relation is removed immediately; if the backend-side drop fails
    /// (e.g. an unbind racing an in-flight action), the credential is queued
    /// and revocation happens on a later registry operation.
    pub async fn unbind(&self, relation_id: &str) -> AppResult<()> {
        let bound = self
            .relations
            .write()
            .await
            .remove(relation_id)
            .ok_or_else(|| AppError::UnknownRelation(relation_id.to_string()))?;

        let backend = bound.relation.backend;
        if let Err(e) = self.grants.drop_principal(backend, &bound.credentials).await {
            tracing::warn!(
                relation_id = %relation_id,
                username = %bound.credentials.username,
                error = %e,
                "principal drop failed, queued for retry"
            );
            self.pending_revocations
                .write()
                .await
                .push((backend, bound.credentials));
        } else {
            tracing::info!(relation_id = %relation_id, "relation unbound, credentials revoked");
        }

        self.flush_pending_revocations().await;
        Ok(())
    }

    /// Returns the active credential set for a relation.
    pub async fn get_credentials(&self, relation_id: &str) -> AppResult<CredentialSet> {
        self.relations
            .read()
            .await
            .get(relation_id)
            .map(|b| b.credentials.clone())
            .ok_or_else(|| AppError::UnknownRelation(relation_id.to_string()))
    }

    /// Lists all active relations.
    pub async fn list(&self) -> Vec<RelationItem> {
        self.relations
            .read()
            .await
            .values()
            .map(BoundRelation::item)
            .collect()
    }

    /// Returns a single active relation.
    pub async fn get(&self, relation_id: &str) -> AppResult<RelationItem> {
        self.relations
            .read()
            .await
            .get(relation_id)
            .map(BoundRelation::item)
            .ok_or_else(|| AppError::UnknownRelation(relation_id.to_string()))
    }

    /// Number of active relations.
    pub async fn relation_count(&self) -> usize {
        self.relations.read().await.len()
    }

    /// Computes the broker status reported to the orchestrator.
    ///
    /// blocked: missing database-name config or no relation yet;
    /// waiting: a bound backend is not reachable yet;
    /// active: every bound backend answers a ping.
    pub async fn status(&self) -> BrokerStatus {
        if self.database_name().await.is_none() {
            return BrokerStatus {
                status: StatusKind::Blocked,
                message: "waiting for database-name configuration".into(),
            };
        }

        let backends: HashSet<BackendType> = self
            .relations
            .read()
            .await
            .values()
            .map(|b| b.relation.backend)
            .collect();

        if backends.is_empty() {
            return BrokerStatus {
                status: StatusKind::Blocked,
                message: "waiting for a backend relation".into(),
            };
        }

        for backend in backends {
            if let Err(e) = self.grants.ping(backend).await {
                return BrokerStatus {
                    status: StatusKind::Waiting,
                    message: format!("backend {} is not ready: {}", backend, e),
                };
            }
        }

        BrokerStatus {
            status: StatusKind::Active,
            message: "all relations active".into(),
        }
    }

    /// Mints a credential set and records its identity for the distinctness
    /// invariant. A collision with a previously issued identity is fatal.
    async fn issue(&self, database: &str, backend: BackendType) -> AppResult<CredentialSet> {
        let credentials = CredentialSet {
            username: CredentialGenerator::username(),
            password: CredentialGenerator::password(),
            endpoints: self.endpoints_for(backend),
            database: database.to_string(),
        };

        self.record_issued(database, credentials.identity()).await?;
        Ok(credentials)
    }

    /// Records a credential identity; an exact re-issue violates the
    /// distinctness invariant and is fatal.
    async fn record_issued(&self, database: &str, identity: (String, String)) -> AppResult<()> {
        let mut issued = self.issued.write().await;
        let seen = issued.entry(database.to_string()).or_default();
        if !seen.insert(identity) {
            return Err(AppError::DuplicateCredential(database.to_string()));
        }
        Ok(())
    }

    /// Retries queued principal drops; failures stay queued.
    async fn flush_pending_revocations(&self) {
        let mut pending = self.pending_revocations.write().await;
        if pending.is_empty() {
            return;
        }
        let queued = std::mem::take(&mut *pending);
        for (backend, credentials) in queued {
            match self.grants.drop_principal(backend, &credentials).await {
                Ok(()) => {
                    tracing::info!(username = %credentials.username, "queued revocation completed");
                }
                Err(e) => {
                    tracing::warn!(username = %credentials.username, error = %e, "queued revocation still failing");
                    pending.push((backend, credentials));
                }
            }
        }
    }

    fn endpoints_for(&self, backend: BackendType) -> Vec<String> {
        let raw = match backend {
            BackendType::MySql => &self.config.mysql_endpoints,
            BackendType::Postgres => &self.config.postgres_endpoints,
            BackendType::MongoDb => &self.config.mongodb_endpoints,
        };
        raw.split(',').map(|s| s.trim().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// In-memory backend world shared by the mock grant backend and the
    /// in-memory action executor below.
    #[derive(Default)]
    struct MemoryWorld {
        databases: HashSet<String>,
        principals: HashSet<(String, String)>,
        /// database -> stored records
        records: HashMap<String, Vec<String>>,
        tables: HashSet<String>,
    }

    struct MemoryGrants {
        world: Arc<Mutex<MemoryWorld>>,
        reachable: AtomicBool,
        fail_drop: AtomicBool,
        drop_attempts: AtomicUsize,
    }

    impl MemoryGrants {
        fn new(world: Arc<Mutex<MemoryWorld>>) -> Self {
            Self {
                world,
                reachable: AtomicBool::new(true),
                fail_drop: AtomicBool::new(false),
                drop_attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GrantBackend for MemoryGrants {
        async fn ensure_database(&self, _backend: BackendType, database: &str) -> AppResult<()> {
            self.world.lock().await.databases.insert(database.to_string());
            Ok(())
        }

        async fn create_principal(
            &self,
            _backend: BackendType,
            creds: &CredentialSet,
        ) -> AppResult<()> {
            if !self.reachable.load(Ordering::SeqCst) {
                return Err(AppError::ConnectionFailed("backend down".into()));
            }
            self.world.lock().await.principals.insert(creds.identity());
            Ok(())
        }

        async fn drop_principal(
            &self,
            _backend: BackendType,
            creds: &CredentialSet,
        ) -> AppResult<()> {
            self.drop_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_drop.load(Ordering::SeqCst) {
                return Err(AppError::ConnectionFailed("backend down".into()));
            }
            // Dropping an absent principal is a no-op
            self.world.lock().await.principals.remove(&creds.identity());
            Ok(())
        }

        async fn ping(&self, _backend: BackendType) -> AppResult<()> {
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(AppError::ConnectionFailed("backend down".into()))
            }
        }
    }

    /// In-memory stand-in for the executor-service action path, validating
    /// credentials against the shared world like a real backend would.
    struct MemoryExecutor {
        world: Arc<Mutex<MemoryWorld>>,
    }

    const RECORD_VALUE: &str = "ephemeral-data";

    impl MemoryExecutor {
        async fn execute(
            &self,
            action: common::models::DatabaseAction,
            creds: &CredentialSet,
            database: &str,
        ) -> AppResult<()> {
            use common::models::DatabaseAction;

            let mut world = self.world.lock().await;
            if !world.principals.contains(&creds.identity()) {
                return Err(AppError::AuthenticationFailed(creds.username.clone()));
            }
            match action {
                DatabaseAction::CreateTable => {
                    world.tables.insert(database.to_string());
                    Ok(())
                }
                DatabaseAction::InsertData => {
                    if !world.tables.contains(database) {
                        return Err(AppError::NotFound(database.to_string()));
                    }
                    world
                        .records
                        .entry(database.to_string())
                        .or_default()
                        .push(RECORD_VALUE.to_string());
                    Ok(())
                }
                DatabaseAction::CheckInsertedData => {
                    let present = world
                        .records
                        .get(database)
                        .is_some_and(|rows| rows.iter().any(|r| r == RECORD_VALUE));
                    if present {
                        Ok(())
                    } else {
                        Err(AppError::NotFound(database.to_string()))
                    }
                }
            }
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            service: "broker-service".into(),
            host: "127.0.0.1".into(),
            port: 0,
            connect_timeout_secs: 1,
            max_connections: 1,
            database_name: None,
            mysql_admin_url: String::new(),
            mysql_endpoints: "localhost:3306".into(),
            postgres_admin_url: String::new(),
            postgres_endpoints: "localhost:5432".into(),
            mongodb_admin_uri: String::new(),
            mongodb_endpoints: "localhost:27017".into(),
        }
    }

    fn bind_req(id: &str) -> BindRequest {
        BindRequest {
            relation_id: id.to_string(),
            consumer: "app".to_string(),
            backend: BackendType::MySql,
            database: None,
        }
    }

    fn broker_with_world() -> (RelationBroker, Arc<MemoryGrants>, Arc<Mutex<MemoryWorld>>) {
        let world = Arc::new(Mutex::new(MemoryWorld::default()));
        let grants = Arc::new(MemoryGrants::new(world.clone()));
        let broker = RelationBroker::new(test_config(), grants.clone());
        (broker, grants, world)
    }

    #[tokio::test]
    async fn test_bind_without_config_is_rejected() {
        let (broker, _, _) = broker_with_world();
        let err = broker.bind(bind_req("db:1")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_bind_issues_credentials_and_creates_principal() {
        let (broker, _, world) = broker_with_world();
        broker.set_database_name("testdb".into()).await.unwrap();

        let (item, creds) = broker.bind(bind_req("db:1")).await.unwrap();
        assert_eq!(item.database, "testdb");
        assert_eq!(creds.database, "testdb");
        assert_eq!(creds.endpoints, vec!["localhost:3306".to_string()]);
        assert!(world.lock().await.principals.contains(&creds.identity()));
        assert!(world.lock().await.databases.contains("testdb"));
    }

    #[tokio::test]
    async fn test_duplicate_relation_id_is_rejected() {
        let (broker, _, _) = broker_with_world();
        broker.set_database_name("testdb".into()).await.unwrap();
        broker.bind(bind_req("db:1")).await.unwrap();

        let err = broker.bind(bind_req("db:1")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unbind_unknown_relation_fails() {
        let (broker, _, _) = broker_with_world();
        let err = broker.unbind("db:9").await.unwrap_err();
        assert!(matches!(err, AppError::UnknownRelation(_)));
    }

    #[tokio::test]
    async fn test_rebind_yields_distinct_credentials() {
        let (broker, _, _) = broker_with_world();
        broker.set_database_name("testdb".into()).await.unwrap();

        let (_, first) = broker.bind(bind_req("db:1")).await.unwrap();
        broker.unbind("db:1").await.unwrap();
        let (_, second) = broker.bind(bind_req("db:1")).await.unwrap();

        assert_ne!(first, second);
        assert_ne!(first.identity(), second.identity());
        assert_eq!(first.database, second.database);
    }

    #[tokio::test]
    async fn test_unbind_revokes_principal() {
        let (broker, _, world) = broker_with_world();
        broker.set_database_name("testdb".into()).await.unwrap();

        let (_, creds) = broker.bind(bind_req("db:1")).await.unwrap();
        broker.unbind("db:1").await.unwrap();

        assert!(!world.lock().await.principals.contains(&creds.identity()));
        assert!(matches!(
            broker.get_credentials("db:1").await.unwrap_err(),
            AppError::UnknownRelation(_)
        ));
    }

    #[tokio::test]
    async fn test_failed_drop_is_retried_on_later_operations() {
        let (broker, grants, world) = broker_with_world();
        broker.set_database_name("testdb".into()).await.unwrap();

        let (_, creds) = broker.bind(bind_req("db:1")).await.unwrap();
        grants.fail_drop.store(true, Ordering::SeqCst);

        // Unbind succeeds even though the backend drop failed
        broker.unbind("db:1").await.unwrap();
        assert!(world.lock().await.principals.contains(&creds.identity()));

        // Next operation flushes the queued revocation
        grants.fail_drop.store(false, Ordering::SeqCst);
        broker.bind(bind_req("db:2")).await.unwrap();
        assert!(!world.lock().await.principals.contains(&creds.identity()));
    }

    #[tokio::test]
    async fn test_revoking_already_dropped_principal_is_noop() {
        let (broker, grants, world) = broker_with_world();
        broker.set_database_name("testdb".into()).await.unwrap();

        let (_, creds) = broker.bind(bind_req("db:1")).await.unwrap();
        grants.fail_drop.store(true, Ordering::SeqCst);
        broker.unbind("db:1").await.unwrap();

        // The principal disappears out-of-band before the queued
        // revocation gets retried
        world.lock().await.principals.remove(&creds.identity());
        grants.fail_drop.store(false, Ordering::SeqCst);

        // The flushed revocation finds nothing to drop and still succeeds
        broker.bind(bind_req("db:2")).await.unwrap();
        assert_eq!(grants.drop_attempts.load(Ordering::SeqCst), 2);

        // Queue drained: later operations do not retry the revocation
        broker.bind(bind_req("db:3")).await.unwrap();
        assert_eq!(grants.drop_attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let (broker, grants, _) = broker_with_world();
        assert_eq!(broker.status().await.status, StatusKind::Blocked);

        broker.set_database_name("testdb".into()).await.unwrap();
        assert_eq!(broker.status().await.status, StatusKind::Blocked);

        broker.bind(bind_req("db:1")).await.unwrap();
        assert_eq!(broker.status().await.status, StatusKind::Active);

        grants.reachable.store(false, Ordering::SeqCst);
        assert_eq!(broker.status().await.status, StatusKind::Waiting);

        grants.reachable.store(true, Ordering::SeqCst);
        assert_eq!(broker.status().await.status, StatusKind::Active);
    }

    #[tokio::test]
    async fn test_duplicate_credential_identity_is_fatal() {
        let (broker, _, _) = broker_with_world();
        let identity = ("rel_0_abcd1234".to_string(), "pw".to_string());

        broker
            .record_issued("testdb", identity.clone())
            .await
            .unwrap();
        let err = broker
            .record_issued("testdb", identity.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateCredential(_)));

        // Same identity on a different database is a separate namespace
        broker.record_issued("otherdb", identity).await.unwrap();
    }

    #[tokio::test]
    async fn test_revoked_credentials_fail_authentication() {
        let (broker, _, world) = broker_with_world();
        broker.set_database_name("testdb".into()).await.unwrap();
        let executor = MemoryExecutor {
            world: world.clone(),
        };

        let (_, creds) = broker.bind(bind_req("db:1")).await.unwrap();
        broker.unbind("db:1").await.unwrap();

        let err = executor
            .execute(common::models::DatabaseAction::CreateTable, &creds, "testdb")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_full_lifecycle_data_survives_credential_rotation() {
        use common::models::DatabaseAction::*;

        let (broker, _, world) = broker_with_world();
        broker.set_database_name("testdb".into()).await.unwrap();
        let executor = MemoryExecutor {
            world: world.clone(),
        };

        // bind -> active -> create-table -> insert-data -> check
        let (_, creds) = broker.bind(bind_req("db:1")).await.unwrap();
        assert_eq!(broker.status().await.status, StatusKind::Active);
        executor.execute(CreateTable, &creds, "testdb").await.unwrap();
        executor.execute(InsertData, &creds, "testdb").await.unwrap();
        executor
            .execute(CheckInsertedData, &creds, "testdb")
            .await
            .unwrap();

        // unbind -> rebind -> credentials differ -> check still succeeds
        broker.unbind("db:1").await.unwrap();
        let (_, new_creds) = broker.bind(bind_req("db:1")).await.unwrap();
        assert_ne!(creds, new_creds);
        executor
            .execute(CheckInsertedData, &new_creds, "testdb")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_check_without_insert_is_not_found() {
        use common::models::DatabaseAction::*;

        let (broker, _, world) = broker_with_world();
        broker.set_database_name("freshdb".into()).await.unwrap();
        let executor = MemoryExecutor {
            world: world.clone(),
        };

        let (_, creds) = broker.bind(bind_req("db:1")).await.unwrap();
        let err = executor
            .execute(CheckInsertedData, &creds, "freshdb")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
