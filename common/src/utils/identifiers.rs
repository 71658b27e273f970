//! Database identifier validator.
//!
//! Database and collection names are interpolated into DDL statements and
//! run-commands, so they must be restricted to safe identifier characters.

use crate::errors::AppError;

/// Validates database/collection identifiers.
pub struct IdentValidator;

/// Maximum identifier length accepted by all supported backends.
const MAX_IDENT_LEN: usize = 64;

impl IdentValidator {
    /// Validates a database or collection name.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if the name is empty, too long, starts
    /// with a digit, or contains characters outside `[a-zA-Z0-9_]`.
    pub fn validate(name: &str) -> Result<(), AppError> {
        if name.is_empty() || name.len() > MAX_IDENT_LEN {
            return Err(AppError::Validation(format!(
                "identifier must be 1-{} characters",
                MAX_IDENT_LEN
            )));
        }
        if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return Err(AppError::Validation(
                "identifier must not start with a digit".into(),
            ));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::Validation(format!(
                "identifier contains forbidden characters: {}",
                name
            )));
        }
        Ok(())
    }
}
