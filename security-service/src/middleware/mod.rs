pub mod auth;
pub mod metrics;
pub mod permission;

pub use auth::{session_middleware, ClientInfo, CurrentSession};
pub use metrics::metrics_middleware;
pub use permission::{require_permission, PermissionGate};
