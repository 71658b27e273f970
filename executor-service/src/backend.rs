//! Per-backend action execution.
//!
//! Connections are short-lived and scoped to a single action invocation,
//! since the credential set may have rotated between invocations. Connection
//! establishment retries with bounded exponential backoff while the backend
//! is not yet ready; all other failures surface immediately.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use mongodb::bson::{doc, Document};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::Row;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::{ActionRequest, ActionResult, BackendType, CredentialSet, DatabaseAction};

/// Fixed table/collection used by the action triple.
pub const TABLE_NAME: &str = "app_data";
/// Fixed record value written by insert-data and probed by check-inserted-data.
pub const RECORD_VALUE: &str = "ephemeral-data";

const CONNECT_RETRIES: usize = 3;

/// Executes an action against the backend named in the request.
pub async fn execute(config: &AppConfig, req: &ActionRequest) -> AppResult<ActionResult> {
    match req.backend {
        BackendType::MySql => execute_mysql(config, req).await,
        BackendType::Postgres => execute_postgres(config, req).await,
        BackendType::MongoDb => execute_mongodb(config, req).await,
    }
}

async fn execute_mysql(config: &AppConfig, req: &ActionRequest) -> AppResult<ActionResult> {
    let url = mysql_url(&req.credentials, &req.database_name)?;
    let timeout = Duration::from_secs(config.connect_timeout_secs);

    let pool = (|| async {
        MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect(&url)
            .await
    })
    .retry(retry_policy())
    .when(is_transient_sql_error)
    .await
    .map_err(map_sql_error)?;

    let result = match req.action {
        DatabaseAction::CreateTable => {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INT AUTO_INCREMENT PRIMARY KEY,
                    data VARCHAR(255) NOT NULL
                )",
                TABLE_NAME
            ))
            .execute(&pool)
            .await
            .map_err(map_sql_error)?;
            ActionResult::ok(req.action)
        }
        DatabaseAction::InsertData => {
            sqlx::query(&format!("INSERT INTO {} (data) VALUES (?)", TABLE_NAME))
                .bind(RECORD_VALUE)
                .execute(&pool)
                .await
                .map_err(map_sql_error)?;
            ActionResult::ok_with_detail(req.action, "1 row inserted")
        }
        DatabaseAction::CheckInsertedData => {
            let row = sqlx::query(&format!(
                "SELECT COUNT(*) AS cnt FROM {} WHERE data = ?",
                TABLE_NAME
            ))
            .bind(RECORD_VALUE)
            .fetch_one(&pool)
            .await
            .map_err(map_sql_error)?;
            let count: i64 = row.try_get("cnt").map_err(map_sql_error)?;
            check_result(req.action, count > 0, &req.database_name)?
        }
    };

    pool.close().await;
    Ok(result)
}

async fn execute_postgres(config: &AppConfig, req: &ActionRequest) -> AppResult<ActionResult> {
    let url = postgres_url(&req.credentials, &req.database_name)?;
    let timeout = Duration::from_secs(config.connect_timeout_secs);

    let pool = (|| async {
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect(&url)
            .await
    })
    .retry(retry_policy())
    .when(is_transient_sql_error)
    .await
    .map_err(map_sql_error)?;

    let result = match req.action {
        DatabaseAction::CreateTable => {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id SERIAL PRIMARY KEY,
                    data TEXT NOT NULL
                )",
                TABLE_NAME
            ))
            .execute(&pool)
            .await
            .map_err(map_sql_error)?;
            ActionResult::ok(req.action)
        }
        DatabaseAction::InsertData => {
            sqlx::query(&format!("INSERT INTO {} (data) VALUES ($1)", TABLE_NAME))
                .bind(RECORD_VALUE)
                .execute(&pool)
                .await
                .map_err(map_sql_error)?;
            ActionResult::ok_with_detail(req.action, "1 row inserted")
        }
        DatabaseAction::CheckInsertedData => {
            let row = sqlx::query(&format!(
                "SELECT COUNT(*) AS cnt FROM {} WHERE data = $1",
                TABLE_NAME
            ))
            .bind(RECORD_VALUE)
            .fetch_one(&pool)
            .await
            .map_err(map_sql_error)?;
            let count: i64 = row.try_get("cnt").map_err(map_sql_error)?;
            check_result(req.action, count > 0, &req.database_name)?
        }
    };

    pool.close().await;
    Ok(result)
}

async fn execute_mongodb(_config: &AppConfig, req: &ActionRequest) -> AppResult<ActionResult> {
    let uri = mongodb_uri(&req.credentials, &req.database_name)?;
    let client = mongodb::Client::with_uri_str(&uri)
        .await
        .map_err(map_mongo_error)?;
    let database = client.database(&req.database_name);

    let result = match req.action {
        DatabaseAction::CreateTable => {
            if let Err(e) = database.create_collection(TABLE_NAME).await {
                // NamespaceExists: create-if-absent semantics
                if !is_mongo_namespace_exists(&e) {
                    return Err(map_mongo_error(e));
                }
            }
            ActionResult::ok(req.action)
        }
        DatabaseAction::InsertData => {
            database
                .collection::<Document>(TABLE_NAME)
                .insert_one(doc! { "data": RECORD_VALUE })
                .await
                .map_err(map_mongo_error)?;
            ActionResult::ok_with_detail(req.action, "1 document inserted")
        }
        DatabaseAction::CheckInsertedData => {
            let found = database
                .collection::<Document>(TABLE_NAME)
                .find_one(doc! { "data": RECORD_VALUE })
                .await
                .map_err(map_mongo_error)?;
            check_result(req.action, found.is_some(), &req.database_name)?
        }
    };

    Ok(result)
}

fn check_result(action: DatabaseAction, present: bool, database: &str) -> AppResult<ActionResult> {
    if present {
        Ok(ActionResult::ok_with_detail(action, "record present"))
    } else {
        Err(AppError::NotFound(format!(
            "no inserted record in database {}",
            database
        )))
    }
}

fn retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(200))
        .with_max_times(CONNECT_RETRIES)
}

fn is_transient_sql_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_)
    )
}

// ============== URL Builders ==============

fn primary_endpoint(creds: &CredentialSet) -> AppResult<&str> {
    creds
        .endpoints
        .first()
        .map(String::as_str)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::ConnectionFailed("credential set has no endpoints".into()))
}

fn mysql_url(creds: &CredentialSet, database: &str) -> AppResult<String> {
    let endpoint = primary_endpoint(creds)?;
    Ok(format!(
        "mysql://{}:{}@{}/{}",
        creds.username, creds.password, endpoint, database
    ))
}

fn postgres_url(creds: &CredentialSet, database: &str) -> AppResult<String> {
    let endpoint = primary_endpoint(creds)?;
    Ok(format!(
        "postgres://{}:{}@{}/{}",
        creds.username, creds.password, endpoint, database
    ))
}

fn mongodb_uri(creds: &CredentialSet, database: &str) -> AppResult<String> {
    let endpoint = primary_endpoint(creds)?;
    // Principals are created in their scoped database, hence authSource
    Ok(format!(
        "mongodb://{}:{}@{}/{}?authSource={}",
        creds.username, creds.password, endpoint, database, database
    ))
}

// ============== Error Mapping ==============

fn map_sql_error(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // access denied / invalid password
            Some("28000") | Some("28P01") => AppError::AuthenticationFailed(db.message().into()),
            // missing table or database
            Some("42S02") | Some("42P01") | Some("3D000") => {
                AppError::NotFound(db.message().into())
            }
            _ => AppError::DatabaseQuery(db.message().into()),
        },
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) => {
            AppError::ConnectionFailed(e.to_string())
        }
        sqlx::Error::RowNotFound => AppError::NotFound(e.to_string()),
        _ => AppError::DatabaseQuery(e.to_string()),
    }
}

fn map_mongo_error(e: mongodb::error::Error) -> AppError {
    use mongodb::error::ErrorKind;
    match e.kind.as_ref() {
        ErrorKind::Authentication { .. } => AppError::AuthenticationFailed(e.to_string()),
        // 13: unauthorized, 18: authentication failed
        ErrorKind::Command(cmd) if cmd.code == 13 || cmd.code == 18 => {
            AppError::AuthenticationFailed(e.to_string())
        }
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => {
            AppError::ConnectionFailed(e.to_string())
        }
        _ => AppError::DatabaseQuery(e.to_string()),
    }
}

fn is_mongo_namespace_exists(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        mongodb::error::ErrorKind::Command(cmd) if cmd.code == 48
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(endpoints: Vec<String>) -> CredentialSet {
        CredentialSet {
            username: "rel_1_ab12cd34".into(),
            password: "pw".into(),
            endpoints,
            database: "testdb".into(),
        }
    }

    #[test]
    fn test_url_builders() {
        let c = creds(vec!["db.host:3306".into()]);
        assert_eq!(
            mysql_url(&c, "testdb").unwrap(),
            "mysql://rel_1_ab12cd34:pw@db.host:3306/testdb"
        );
        assert_eq!(
            postgres_url(&c, "testdb").unwrap(),
            "postgres://rel_1_ab12cd34:pw@db.host:3306/testdb"
        );
        assert_eq!(
            mongodb_uri(&c, "testdb").unwrap(),
            "mongodb://rel_1_ab12cd34:pw@db.host:3306/testdb?authSource=testdb"
        );
    }

    #[test]
    fn test_missing_endpoints_is_connection_error() {
        let c = creds(vec![]);
        assert!(matches!(
            mysql_url(&c, "testdb").unwrap_err(),
            AppError::ConnectionFailed(_)
        ));
    }

    #[test]
    fn test_sql_error_mapping() {
        assert!(matches!(
            map_sql_error(sqlx::Error::PoolTimedOut),
            AppError::ConnectionFailed(_)
        ));
        assert!(matches!(
            map_sql_error(sqlx::Error::RowNotFound),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn test_transient_detection() {
        assert!(is_transient_sql_error(&sqlx::Error::PoolTimedOut));
        assert!(!is_transient_sql_error(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_check_result_semantics() {
        assert!(check_result(DatabaseAction::CheckInsertedData, true, "db").is_ok());
        assert!(matches!(
            check_result(DatabaseAction::CheckInsertedData, false, "db").unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
