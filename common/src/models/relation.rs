//! Relation models.
//!
//! Contains models for relation lifecycle management between consumer
//! applications and database backends.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Database backend type enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// MySQL database.
    MySql,
    /// PostgreSQL database.
    Postgres,
    /// MongoDB document store.
    MongoDb,
}

impl BackendType {
    /// Returns the default port for this backend type.
    pub fn default_port(&self) -> u16 {
        match self {
            BackendType::MySql => 3306,
            BackendType::Postgres => 5432,
            BackendType::MongoDb => 27017,
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::MySql => write!(f, "mysql"),
            BackendType::Postgres => write!(f, "postgres"),
            BackendType::MongoDb => write!(f, "mongodb"),
        }
    }
}

/// An active relation between a consumer and a backend (stored internally).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Relation {
    /// Relation identifier (unique among active relations).
    pub relation_id: String,
    /// Name of the consumer application.
    pub consumer: String,
    /// Backend type the relation targets.
    pub backend: BackendType,
    /// Database or collection name the relation is scoped to.
    pub database: String,
    /// Bind timestamp.
    pub bound_at: String,
}

/// Request body for binding a new relation.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BindRequest {
    /// Relation identifier assigned by the orchestrator.
    #[validate(length(min = 1, max = 64, message = "Relation id must be 1-64 characters"))]
    pub relation_id: String,
    /// Name of the consumer application.
    #[validate(length(min = 1, max = 100, message = "Consumer must be 1-100 characters"))]
    pub consumer: String,
    /// Backend type to relate to.
    pub backend: BackendType,
    /// Database name; falls back to the configured database-name when absent.
    pub database: Option<String>,
}

/// Relation item for API responses (no credential material).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RelationItem {
    /// Relation identifier.
    pub relation_id: String,
    /// Name of the consumer application.
    pub consumer: String,
    /// Backend type.
    pub backend: BackendType,
    /// Database or collection name.
    pub database: String,
    /// Username of the active credential set.
    pub username: String,
    /// Bind timestamp.
    pub bound_at: String,
}

/// Broker status values reported to the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// Missing required configuration or relation.
    Blocked,
    /// A dependency is not yet active.
    Waiting,
    /// Fully operational.
    Active,
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusKind::Blocked => write!(f, "blocked"),
            StatusKind::Waiting => write!(f, "waiting"),
            StatusKind::Active => write!(f, "active"),
        }
    }
}

/// Broker status response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BrokerStatus {
    /// Current status.
    pub status: StatusKind,
    /// Human-readable explanation.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_serde_tags_are_lowercase() {
        assert_eq!(
            serde_json::to_string(&BackendType::MySql).unwrap(),
            "\"mysql\""
        );
        assert_eq!(
            serde_json::to_string(&BackendType::MongoDb).unwrap(),
            "\"mongodb\""
        );
        let parsed: BackendType = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(parsed, BackendType::Postgres);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(serde_json::from_str::<BackendType>("\"kafka\"").is_err());
    }

    #[test]
    fn test_status_serde_tags() {
        assert_eq!(
            serde_json::to_string(&StatusKind::Blocked).unwrap(),
            "\"blocked\""
        );
        assert_eq!(StatusKind::Active.to_string(), "active");
    }
}
