use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::{MonitorError, Result};

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Bearer-token session obtained from the controller API's token endpoint.
#[derive(Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Raw token-endpoint payload. Every field is optional so a missing one can be named.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_session(self, issued_at: DateTime<Utc>) -> Result<Session> {
        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| missing_field("access_token"))?;
        let expires_in = self.expires_in.ok_or_else(|| missing_field("expires_in"))?;
        let refresh_token = self
            .refresh_token
            .ok_or_else(|| missing_field("refresh_token"))?;

        if expires_in <= 0 {
            return Err(MonitorError::Auth(format!(
                "token response has non-positive `expires_in` ({expires_in})"
            )));
        }

        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                MonitorError::Auth(format!(
                    "token response has out-of-range `expires_in` ({expires_in})"
                ))
            })?;

        Ok(Session {
            access_token,
            refresh_token,
            expires_at,
        })
    }
}

fn missing_field(name: &str) -> MonitorError {
    MonitorError::Auth(format!("token response is missing `{name}`"))
}

/// Values the caller supplies before any pipeline run.
#[derive(Clone)]
pub struct Credentials {
    pub controller_id: i64,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(controller_id: &str, username: &str, password: &str) -> Result<Self> {
        let controller_id = controller_id.trim().parse::<i64>().map_err(|_| {
            MonitorError::Config(format!("controller id {controller_id:?} is not an integer"))
        })?;
        if username.is_empty() {
            return Err(MonitorError::Config("username is empty".into()));
        }

        Ok(Self {
            controller_id,
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("controller_id", &self.controller_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn token(access: Option<&str>, expires_in: Option<i64>, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: access.map(str::to_string),
            expires_in,
            refresh_token: refresh.map(str::to_string),
        }
    }

    #[test]
    fn expiry_is_issue_time_plus_lifetime() {
        let session = token(Some("abc"), Some(3_661), Some("def"))
            .into_session(issued_at())
            .unwrap();
        assert_eq!(session.expires_at, Utc.with_ymd_and_hms(2024, 6, 1, 9, 1, 1).unwrap());
        assert_eq!(session.refresh_token, "def");
    }

    #[test]
    fn oversized_lifetime_is_an_auth_error() {
        for expires_in in [1_000_000_000_000_000, i64::MAX] {
            let err = token(Some("a"), Some(expires_in), Some("r"))
                .into_session(issued_at())
                .unwrap_err();
            assert!(matches!(err, MonitorError::Auth(ref msg) if msg.contains("out-of-range")));
        }
    }

    #[test]
    fn missing_fields_are_named() {
        let err = token(None, Some(10), Some("r")).into_session(issued_at()).unwrap_err();
        assert_eq!(err, MonitorError::Auth("token response is missing `access_token`".into()));

        let err = token(Some("a"), None, Some("r")).into_session(issued_at()).unwrap_err();
        assert_eq!(err, MonitorError::Auth("token response is missing `expires_in`".into()));

        let err = token(Some("a"), Some(10), None).into_session(issued_at()).unwrap_err();
        assert_eq!(err, MonitorError::Auth("token response is missing `refresh_token`".into()));
    }

    #[test]
    fn expiry_check_includes_skew() {
        let session = token(Some("a"), Some(3_600), Some("r"))
            .into_session(issued_at())
            .unwrap();

        assert!(!session.is_expired_at(issued_at()));
        assert!(session.is_expired_at(issued_at() + Duration::seconds(3_600 - 30)));
        assert!(session.is_expired_at(issued_at() + Duration::seconds(7_200)));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let session = token(Some("secret-token"), Some(60), Some("secret-refresh"))
            .into_session(issued_at())
            .unwrap();
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret"));

        let credentials = Credentials::new("1234", "me@example.com", "hunter2").unwrap();
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }

    #[test]
    fn credentials_require_integer_controller_id() {
        assert_eq!(Credentials::new(" 42 ", "u", "p").unwrap().controller_id, 42);
        assert!(matches!(
            Credentials::new("ctrl-42", "u", "p"),
            Err(MonitorError::Config(_))
        ));
    }
}
