use chrono::{DateTime, Utc};

use crate::{
    error::{MonitorError, Result},
    log_info,
    models::{Session, TokenResponse},
    settings::ApiSettings,
};

use super::transport::{truncate_for_error, ApiTransport};

const ENABLE_LOGS: bool = true;

/// Exchange username and password for a bearer-token session.
pub async fn authenticate(
    transport: &dyn ApiTransport,
    api: &ApiSettings,
    username: &str,
    password: &str,
) -> Result<Session> {
    authenticate_at(transport, api, username, password, Utc::now()).await
}

pub(crate) async fn authenticate_at(
    transport: &dyn ApiTransport,
    api: &ApiSettings,
    username: &str,
    password: &str,
    issued_at: DateTime<Utc>,
) -> Result<Session> {
    let form = [
        ("grant_type", "password"),
        ("client_id", api.client_id.as_str()),
        ("client_secret", api.client_secret.as_str()),
        ("username", username),
        ("password", password),
        ("scope", api.scope.as_str()),
    ];

    let reply = transport
        .post_form(&api.access_token_url, &form)
        .await
        .map_err(|err| MonitorError::Auth(format!("token request failed: {err:#}")))?;

    if !reply.is_success() {
        return Err(MonitorError::Auth(format!(
            "token endpoint returned HTTP {}: {}",
            reply.status,
            truncate_for_error(&reply.body)
        )));
    }

    let token: TokenResponse = serde_json::from_str(&reply.body).map_err(|err| {
        MonitorError::Auth(format!("token response is not valid JSON: {err}"))
    })?;
    let session = token.into_session(issued_at)?;

    log_info!("Authenticated as {username}; token expires at {}", session.expires_at);
    Ok(session)
}
