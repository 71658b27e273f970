//! Shared library for the relation broker services.
//!
//! Contains the error taxonomy, configuration loading, request/response
//! models, the unified API response envelope, middleware and small utilities
//! shared by `broker-service` and `executor-service`.

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
