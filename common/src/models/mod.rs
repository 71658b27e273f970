//! Shared data models.

pub mod action;
pub mod credential;
pub mod relation;

pub use action::{ActionRequest, ActionResult, DatabaseAction};
pub use credential::CredentialSet;
pub use relation::{BackendType, BindRequest, BrokerStatus, Relation, RelationItem, StatusKind};
