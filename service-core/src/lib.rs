//! service-core: shared plumbing for the subscription backend.
//!
//! Error responses, layered configuration, tracing setup, HTTP middleware
//! and HMAC helpers.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod utils;
