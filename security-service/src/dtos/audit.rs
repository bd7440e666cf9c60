use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use service_core::error::AppError;

use crate::models::{AuditEvent, LockoutInfo, SecurityAlert, SuspiciousActivity};
use crate::services::AuditQuery;

pub const DEFAULT_ALERT_LIMIT: usize = 50;
pub const MAX_ALERT_LIMIT: usize = 500;

/// Query string for `GET /audit/events`. List filters are comma separated,
/// e.g. `event_types=AUTHENTICATION,AUTHORIZATION&outcomes=FAILURE`.
#[derive(Debug, Default, Deserialize)]
pub struct AuditEventsParams {
    pub event_types: Option<String>,
    pub categories: Option<String>,
    pub severities: Option<String>,
    pub outcomes: Option<String>,
    pub identity_ids: Option<String>,
    pub identity_emails: Option<String>,
    pub origin_ips: Option<String>,
    pub tags: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub min_risk: Option<u8>,
    pub max_risk: Option<u8>,
    pub search: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

fn split(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Parse comma separated enum names (case-insensitive) through their serde
/// representation.
fn split_enum<T: DeserializeOwned>(field: &str, raw: Option<String>) -> Result<Vec<T>, AppError> {
    split(raw)
        .into_iter()
        .map(|v| {
            serde_json::from_value(serde_json::Value::String(v.to_ascii_uppercase())).map_err(|_| {
                AppError::BadRequest(anyhow::anyhow!("Invalid value '{}' for {}", v, field))
            })
        })
        .collect()
}

impl TryFrom<AuditEventsParams> for AuditQuery {
    type Error = AppError;

    fn try_from(params: AuditEventsParams) -> Result<Self, Self::Error> {
        if let (Some(min), Some(max)) = (params.min_risk, params.max_risk) {
            if min > max {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "min_risk must not exceed max_risk"
                )));
            }
        }

        Ok(AuditQuery {
            event_types: split_enum("event_types", params.event_types)?,
            categories: split_enum("categories", params.categories)?,
            severities: split_enum("severities", params.severities)?,
            outcomes: split_enum("outcomes", params.outcomes)?,
            identity_ids: split(params.identity_ids),
            identity_emails: split(params.identity_emails),
            origin_ips: split(params.origin_ips),
            tags: split(params.tags),
            from: params.from,
            to: params.to,
            min_risk: params.min_risk,
            max_risk: params.max_risk,
            search: params.search,
            offset: params.offset,
            limit: params.limit,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AuditEventsResponse {
    pub events: Vec<AuditEvent>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SuspiciousActivityResponse {
    pub activities: Vec<SuspiciousActivity>,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertsParams {
    pub limit: Option<usize>,
}

impl AlertsParams {
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_ALERT_LIMIT).clamp(1, MAX_ALERT_LIMIT)
    }
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<SecurityAlert>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct LockoutResponse {
    pub email: String,
    #[serde(flatten)]
    pub info: LockoutInfo,
}

#[derive(Debug, Serialize)]
pub struct ClearLockoutResponse {
    pub email: String,
    pub cleared_attempts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditEventType, AuditOutcome};

    #[test]
    fn test_params_convert_to_query() {
        let params = AuditEventsParams {
            event_types: Some("authentication, AUTHORIZATION".to_string()),
            outcomes: Some("failure".to_string()),
            identity_emails: Some("a@x.com,,b@x.com".to_string()),
            limit: Some(10),
            ..AuditEventsParams::default()
        };

        let query = AuditQuery::try_from(params).unwrap();
        assert_eq!(
            query.event_types,
            vec![AuditEventType::Authentication, AuditEventType::Authorization]
        );
        assert_eq!(query.outcomes, vec![AuditOutcome::Failure]);
        assert_eq!(query.identity_emails, vec!["a@x.com", "b@x.com"]);
        assert_eq!(query.effective_limit(), 10);
    }

    #[test]
    fn test_unknown_enum_value_is_rejected() {
        let params = AuditEventsParams {
            severities: Some("apocalyptic".to_string()),
            ..AuditEventsParams::default()
        };
        assert!(AuditQuery::try_from(params).is_err());
    }

    #[test]
    fn test_inverted_risk_range_is_rejected() {
        let params = AuditEventsParams {
            min_risk: Some(80),
            max_risk: Some(20),
            ..AuditEventsParams::default()
        };
        assert!(AuditQuery::try_from(params).is_err());
    }
}
