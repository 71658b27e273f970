//! Shared utilities.

pub mod credentials;
pub mod identifiers;

pub use credentials::CredentialGenerator;
pub use identifiers::IdentValidator;
