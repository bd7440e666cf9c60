use service_core::error::AppError;
use thiserror::Error;

use crate::services::access::AccessDenied;
use crate::services::auth::ACCOUNT_LOCKED_MESSAGE;
use crate::services::policy::PolicyViolation;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Password does not meet policy requirements")]
    Validation(Vec<PolicyViolation>),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked")]
    AccountLocked { retry_after: Option<u64> },

    #[error(transparent)]
    Forbidden(#[from] AccessDenied),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(violations) => AppError::Unprocessable {
                message: "Password does not meet policy requirements".to_string(),
                violations: violations.iter().map(ToString::to_string).collect(),
            },
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::AccountLocked { retry_after } => {
                AppError::TooManyRequests(ACCOUNT_LOCKED_MESSAGE.to_string(), retry_after)
            }
            ServiceError::Forbidden(denied) => AppError::Forbidden(anyhow::anyhow!(denied)),
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            ServiceError::InvalidToken => {
                AppError::BadRequest(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::access::Permission;
    use axum::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        let forbidden: AppError = ServiceError::Forbidden(AccessDenied {
            required: vec![Permission::AuditRead],
            any_of: false,
        })
        .into();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert!(forbidden.to_string().contains("audit:read"));

        let locked: AppError = ServiceError::AccountLocked {
            retry_after: Some(60),
        }
        .into();
        assert_eq!(locked.status(), StatusCode::TOO_MANY_REQUESTS);

        let weak: AppError =
            ServiceError::Validation(vec![PolicyViolation::TooShort]).into();
        assert_eq!(weak.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let missing: AppError = ServiceError::NotFound("Session").into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
