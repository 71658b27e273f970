//! Credential material generator.
//!
//! Usernames combine a process-wide monotonic counter with a random suffix,
//! so two sets issued for the same database across separate relation
//! lifecycles can never be equal even within a single process tick.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Generates credential material for newly bound relations.
pub struct CredentialGenerator;

static ISSUE_COUNTER: AtomicU64 = AtomicU64::new(0);

impl CredentialGenerator {
    /// Generates a backend username.
    ///
    /// Format: `rel_<counter>_<8 hex chars>`. Stays within the 32-character
    /// username limit of all supported backends.
    pub fn username() -> String {
        let n = ISSUE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let suffix = Uuid::new_v4().simple().to_string();
        format!("rel_{}_{}", n, &suffix[..8])
    }

    /// Generates a 32-character random password.
    pub fn password() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_usernames_are_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(CredentialGenerator::username()));
        }
    }

    #[test]
    fn test_username_fits_backend_limits() {
        let name = CredentialGenerator::username();
        assert!(name.len() <= 32, "username too long: {}", name);
        assert!(name.starts_with("rel_"));
    }

    #[test]
    fn test_passwords_are_distinct() {
        assert_ne!(
            CredentialGenerator::password(),
            CredentialGenerator::password()
        );
        assert_eq!(CredentialGenerator::password().len(), 32);
    }
}
