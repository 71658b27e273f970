//! Credential set models.
//!
//! A credential set is the access principal published to a relation. Exactly
//! one set is active per active relation; sets issued for the same database
//! across separate relation lifecycles are never equal.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Full credential set (published to the owning relation only).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CredentialSet {
    /// Backend username.
    pub username: String,
    /// Backend password.
    pub password: String,
    /// Backend endpoint addresses (host:port).
    pub endpoints: Vec<String>,
    /// Database or collection name the credentials are scoped to.
    pub database: String,
}

impl CredentialSet {
    /// The `(username, password)` identity pair of this set.
    ///
    /// Two sets with the same identity pair are considered equal for the
    /// distinctness invariant, regardless of endpoints.
    pub fn identity(&self) -> (String, String) {
        (self.username.clone(), self.password.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ignores_endpoints() {
        let a = CredentialSet {
            username: "rel_1_ab12cd34".into(),
            password: "pw".into(),
            endpoints: vec!["host-a:3306".into()],
            database: "testdb".into(),
        };
        let mut b = a.clone();
        b.endpoints = vec!["host-b:3306".into()];
        assert_ne!(a, b);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_credential_json_fields() {
        let set = CredentialSet {
            username: "rel_1_ab12cd34".into(),
            password: "secret".into(),
            endpoints: vec!["localhost:3306".into()],
            database: "testdb".into(),
        };
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["username"], "rel_1_ab12cd34");
        assert_eq!(json["password"], "secret");
        assert_eq!(json["endpoints"][0], "localhost:3306");
        assert_eq!(json["database"], "testdb");
    }
}
