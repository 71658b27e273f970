//! Backend-side grant management.
//!
//! Creates and drops the per-relation database principals on the actual
//! backends (MySQL, PostgreSQL, MongoDB) through lazily created admin
//! connections. Principals are scoped to a single database; dropping a
//! principal never touches the database itself, so stored records outlive
//! every credential lifecycle.
//!
//! On PostgreSQL every principal is a member of a per-database shared owner
//! role and creates its objects as that role, so tables remain fully
//! accessible to principals issued after a rotation.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::doc;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, MySqlPool, PgConnection, PgPool};
use tokio::sync::RwLock;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::{BackendType, CredentialSet};
use common::utils::IdentValidator;

/// Seam between the relation registry and the backend principal stores.
#[async_trait]
pub trait GrantBackend: Send + Sync {
    /// Creates the database/collection namespace if absent.
    async fn ensure_database(&self, backend: BackendType, database: &str) -> AppResult<()>;

    /// Creates a principal with full access to its scoped database.
    async fn create_principal(&self, backend: BackendType, creds: &CredentialSet) -> AppResult<()>;

    /// Drops a principal. Idempotent: dropping an absent principal is a no-op.
    async fn drop_principal(&self, backend: BackendType, creds: &CredentialSet) -> AppResult<()>;

    /// Checks backend reachability.
    async fn ping(&self, backend: BackendType) -> AppResult<()>;
}

/// Admin connection wrapper for different backend types.
#[derive(Clone)]
enum AdminPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    MongoDb(mongodb::Client),
}

/// Production grant backend holding one admin pool per backend type.
///
/// Pools are created on first use and cached, so an unreachable backend only
/// fails the operations that actually target it.
pub struct AdminPools {
    config: AppConfig,
    pools: RwLock<HashMap<BackendType, AdminPool>>,
}

impl AdminPools {
    /// Creates a grant backend over the configured admin URLs.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached admin pool for a backend, creating it when missing.
    async fn admin_pool(&self, backend: BackendType) -> AppResult<AdminPool> {
        if let Some(pool) = self.pools.read().await.get(&backend) {
            return Ok(pool.clone());
        }

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let pool = match backend {
            BackendType::MySql => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(self.config.max_connections)
                    .acquire_timeout(timeout)
                    .connect(&self.config.mysql_admin_url)
                    .await
                    .map_err(|e| AppError::ConnectionFailed(e.to_string()))?;
                AdminPool::MySql(pool)
            }
            BackendType::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(self.config.max_connections)
                    .acquire_timeout(timeout)
                    .connect(&self.config.postgres_admin_url)
                    .await
                    .map_err(|e| AppError::ConnectionFailed(e.to_string()))?;
                AdminPool::Postgres(pool)
            }
            BackendType::MongoDb => {
                let client = mongodb::Client::with_uri_str(&self.config.mongodb_admin_uri)
                    .await
                    .map_err(|e| AppError::ConnectionFailed(e.to_string()))?;
                AdminPool::MongoDb(client)
            }
        };

        self.pools.write().await.insert(backend, pool.clone());
        tracing::info!(backend = %backend, "admin pool created");
        Ok(pool)
    }

    /// Opens a one-off admin connection to a specific Postgres database.
    ///
    /// Schema-level grants only take effect inside the database that holds
    /// the schema, so they cannot run over the admin pool.
    async fn pg_database_conn(&self, database: &str) -> AppResult<PgConnection> {
        let options = PgConnectOptions::from_str(&self.config.postgres_admin_url)
            .map_err(|e| AppError::ConnectionFailed(e.to_string()))?
            .database(database);
        PgConnection::connect_with(&options)
            .await
            .map_err(|e| AppError::ConnectionFailed(e.to_string()))
    }
}

/// Name of the shared NOLOGIN role that owns every object in a database.
fn pg_owner_role(database: &str) -> String {
    format!("{}_owner", database)
}

/// Ordered statements that issue a Postgres principal.
///
/// The principal joins the shared owner role and creates its objects as that
/// role, so tables it leaves behind stay accessible to principals issued
/// later for the same database.
fn pg_principal_statements(creds: &CredentialSet) -> [String; 3] {
    let owner = pg_owner_role(&creds.database);
    [
        format!(
            "CREATE ROLE \"{}\" LOGIN PASSWORD '{}' IN ROLE \"{}\"",
            creds.username, creds.password, owner
        ),
        format!(
            "GRANT CONNECT, TEMPORARY ON DATABASE \"{}\" TO \"{}\"",
            creds.database, creds.username
        ),
        format!(
            "ALTER ROLE \"{}\" SET ROLE \"{}\"",
            creds.username, owner
        ),
    ]
}

#[async_trait]
impl GrantBackend for AdminPools {
    async fn ensure_database(&self, backend: BackendType, database: &str) -> AppResult<()> {
        IdentValidator::validate(database)?;

        match self.admin_pool(backend).await? {
            AdminPool::MySql(pool) => {
                sqlx::query(&format!("CREATE DATABASE IF NOT EXISTS `{}`", database))
                    .execute(&pool)
                    .await
                    .map_err(map_sql_error)?;
            }
            AdminPool::Postgres(pool) => {
                // CREATE DATABASE has no IF NOT EXISTS in Postgres
                let exists: Option<(i32,)> =
                    sqlx::query_as("SELECT 1 FROM pg_database WHERE datname = $1")
                        .bind(database)
                        .fetch_optional(&pool)
                        .await
                        .map_err(map_sql_error)?;
                if exists.is_none() {
                    sqlx::query(&format!("CREATE DATABASE \"{}\"", database))
                        .execute(&pool)
                        .await
                        .map_err(map_sql_error)?;
                }

                let owner = pg_owner_role(database);
                let role_exists: Option<(i32,)> =
                    sqlx::query_as("SELECT 1 FROM pg_roles WHERE rolname = $1")
                        .bind(&owner)
                        .fetch_optional(&pool)
                        .await
                        .map_err(map_sql_error)?;
                if role_exists.is_none() {
                    sqlx::query(&format!("CREATE ROLE \"{}\" NOLOGIN", owner))
                        .execute(&pool)
                        .await
                        .map_err(map_sql_error)?;
                }

                // Schema privileges live inside the target database
                let mut conn = self.pg_database_conn(database).await?;
                sqlx::query(&format!(
                    "GRANT USAGE, CREATE ON SCHEMA public TO \"{}\"",
                    owner
                ))
                .execute(&mut conn)
                .await
                .map_err(map_sql_error)?;
                conn.close().await.ok();
            }
            AdminPool::MongoDb(_) => {
                // MongoDB creates databases and collections implicitly
            }
        }

        tracing::debug!(backend = %backend, database = %database, "database ensured");
        Ok(())
    }

    async fn create_principal(&self, backend: BackendType, creds: &CredentialSet) -> AppResult<()> {
        IdentValidator::validate(&creds.database)?;
        IdentValidator::validate(&creds.username)?;

        match self.admin_pool(backend).await? {
            AdminPool::MySql(pool) => {
                sqlx::query(&format!(
                    "CREATE USER '{}'@'%' IDENTIFIED BY '{}'",
                    creds.username, creds.password
                ))
                .execute(&pool)
                .await
                .map_err(map_sql_error)?;
                sqlx::query(&format!(
                    "GRANT ALL PRIVILEGES ON `{}`.* TO '{}'@'%'",
                    creds.database, creds.username
                ))
                .execute(&pool)
                .await
                .map_err(map_sql_error)?;
                sqlx::query("FLUSH PRIVILEGES")
                    .execute(&pool)
                    .await
                    .map_err(map_sql_error)?;
            }
            AdminPool::Postgres(pool) => {
                for statement in pg_principal_statements(creds) {
                    sqlx::query(&statement)
                        .execute(&pool)
                        .await
                        .map_err(map_sql_error)?;
                }
            }
            AdminPool::MongoDb(client) => {
                client
                    .database(&creds.database)
                    .run_command(doc! {
                        "createUser": &creds.username,
                        "pwd": &creds.password,
                        "roles": [
                            { "role": "readWrite", "db": &creds.database },
                            { "role": "dbAdmin", "db": &creds.database },
                        ],
                    })
                    .await
                    .map_err(map_mongo_error)?;
            }
        }

        tracing::info!(
            backend = %backend,
            database = %creds.database,
            username = %creds.username,
            "principal created"
        );
        Ok(())
    }

    async fn drop_principal(&self, backend: BackendType, creds: &CredentialSet) -> AppResult<()> {
        IdentValidator::validate(&creds.database)?;
        IdentValidator::validate(&creds.username)?;

        match self.admin_pool(backend).await? {
            AdminPool::MySql(pool) => {
                sqlx::query(&format!("DROP USER IF EXISTS '{}'@'%'", creds.username))
                    .execute(&pool)
                    .await
                    .map_err(map_sql_error)?;
            }
            AdminPool::Postgres(pool) => {
                let exists: Option<(i32,)> =
                    sqlx::query_as("SELECT 1 FROM pg_roles WHERE rolname = $1")
                        .bind(&creds.username)
                        .fetch_optional(&pool)
                        .await
                        .map_err(map_sql_error)?;
                if exists.is_some() {
                    // Stray objects go to the shared owner role so stored
                    // records stay accessible after revocation
                    sqlx::query(&format!(
                        "REASSIGN OWNED BY \"{}\" TO \"{}\"",
                        creds.username,
                        pg_owner_role(&creds.database)
                    ))
                    .execute(&pool)
                    .await
                    .map_err(map_sql_error)?;
                    sqlx::query(&format!("DROP OWNED BY \"{}\"", creds.username))
                        .execute(&pool)
                        .await
                        .map_err(map_sql_error)?;
                    sqlx::query(&format!("DROP ROLE IF EXISTS \"{}\"", creds.username))
                        .execute(&pool)
                        .await
                        .map_err(map_sql_error)?;
                }
            }
            AdminPool::MongoDb(client) => {
                let result = client
                    .database(&creds.database)
                    .run_command(doc! { "dropUser": &creds.username })
                    .await;
                if let Err(e) = result {
                    // UserNotFound: the principal is already gone
                    if !is_mongo_user_not_found(&e) {
                        return Err(map_mongo_error(e));
                    }
                }
            }
        }

        tracing::info!(backend = %backend, username = %creds.username, "principal dropped");
        Ok(())
    }

    async fn ping(&self, backend: BackendType) -> AppResult<()> {
        match self.admin_pool(backend).await? {
            AdminPool::MySql(pool) => {
                sqlx::query("SELECT 1")
                    .execute(&pool)
                    .await
                    .map_err(map_sql_error)?;
            }
            AdminPool::Postgres(pool) => {
                sqlx::query("SELECT 1")
                    .execute(&pool)
                    .await
                    .map_err(map_sql_error)?;
            }
            AdminPool::MongoDb(client) => {
                client
                    .database("admin")
                    .run_command(doc! { "ping": 1 })
                    .await
                    .map_err(map_mongo_error)?;
            }
        }
        Ok(())
    }
}

fn map_sql_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) => {
            AppError::ConnectionFailed(e.to_string())
        }
        _ => AppError::DatabaseQuery(e.to_string()),
    }
}

fn map_mongo_error(e: mongodb::error::Error) -> AppError {
    use mongodb::error::ErrorKind;
    match e.kind.as_ref() {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => {
            AppError::ConnectionFailed(e.to_string())
        }
        ErrorKind::Authentication { .. } => AppError::AuthenticationFailed(e.to_string()),
        _ => AppError::DatabaseQuery(e.to_string()),
    }
}

fn is_mongo_user_not_found(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        mongodb::error::ErrorKind::Command(cmd) if cmd.code == 11
    )
}
