//! Database action models.
//!
//! Actions are a closed set; unknown action names fail at deserialization
//! rather than being dispatched by string.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::credential::CredentialSet;
use super::relation::BackendType;

/// Supported database actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum DatabaseAction {
    /// Create the test table/collection if absent (idempotent).
    #[serde(rename = "create-table")]
    CreateTable,
    /// Append the fixed, known record.
    #[serde(rename = "insert-data")]
    InsertData,
    /// Check whether the known record is present.
    #[serde(rename = "check-inserted-data")]
    CheckInsertedData,
}

impl std::fmt::Display for DatabaseAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseAction::CreateTable => write!(f, "create-table"),
            DatabaseAction::InsertData => write!(f, "insert-data"),
            DatabaseAction::CheckInsertedData => write!(f, "check-inserted-data"),
        }
    }
}

/// Request body for invoking a database action.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ActionRequest {
    /// Action to execute.
    pub action: DatabaseAction,
    /// Backend type to execute against.
    pub backend: BackendType,
    /// Credential set to authenticate with.
    pub credentials: CredentialSet,
    /// Database or collection name to operate on.
    #[validate(length(min = 1, max = 64, message = "Database name is required"))]
    pub database_name: String,
}

/// Result of a database action invocation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionResult {
    /// The executed action.
    pub action: DatabaseAction,
    /// Whether the action succeeded.
    pub ok: bool,
    /// Additional detail (rows touched, record found, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ActionResult {
    /// Creates a successful action result.
    pub fn ok(action: DatabaseAction) -> Self {
        Self {
            action,
            ok: true,
            detail: None,
        }
    }

    /// Creates a successful action result with detail text.
    pub fn ok_with_detail(action: DatabaseAction, detail: impl Into<String>) -> Self {
        Self {
            action,
            ok: true,
            detail: Some(detail.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_names_are_literal() {
        assert_eq!(
            serde_json::to_string(&DatabaseAction::CreateTable).unwrap(),
            "\"create-table\""
        );
        assert_eq!(
            serde_json::to_string(&DatabaseAction::InsertData).unwrap(),
            "\"insert-data\""
        );
        assert_eq!(
            serde_json::to_string(&DatabaseAction::CheckInsertedData).unwrap(),
            "\"check-inserted-data\""
        );
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let err = serde_json::from_str::<DatabaseAction>("\"drop-table\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_action_request_roundtrip() {
        let json = r#"{
            "action": "insert-data",
            "backend": "mysql",
            "credentials": {
                "username": "rel_1_ab12cd34",
                "password": "pw",
                "endpoints": ["localhost:3306"],
                "database": "testdb"
            },
            "database_name": "testdb"
        }"#;
        let req: ActionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.action, DatabaseAction::InsertData);
        assert_eq!(req.backend, BackendType::MySql);
        assert_eq!(req.credentials.database, "testdb");
    }
}
