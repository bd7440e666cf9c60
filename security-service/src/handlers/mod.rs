//! HTTP handlers for the security service.

pub mod audit;
pub mod auth;
pub mod metrics;
pub mod security;
