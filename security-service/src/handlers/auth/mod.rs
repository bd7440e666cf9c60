pub mod password;
pub mod session;

pub use password::{
    change_password, confirm_password_reset, password_strength, request_password_reset,
    validate_password_reset,
};
pub use session::{
    current_session, list_sessions, login, logout, permissions, refresh_session, revoke_sessions,
};
