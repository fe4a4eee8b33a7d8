use std::{fmt, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Status and body of an HTTP exchange; interpretation is left to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The two request shapes the controller API needs.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Form-encoded POST, used for the token exchange.
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpReply>;

    /// JSON POST authenticated with `Authorization: Bearer <token>`.
    async fn post_json(
        &self,
        url: &str,
        bearer_token: &str,
        body: &serde_json::Value,
    ) -> Result<HttpReply>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ReqwestTransport")
            .field("client", &self.client)
            .finish()
    }
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("irrigation-monitor/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to initialize HTTP client")?;
        Ok(Self { client })
    }

    async fn into_reply(response: reqwest::Response) -> Result<HttpReply> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .context("failed to read response body")?;
        Ok(HttpReply { status, body })
    }
}

#[async_trait]
impl ApiTransport for ReqwestTransport {
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpReply> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        Self::into_reply(response).await
    }

    async fn post_json(
        &self,
        url: &str,
        bearer_token: &str,
        body: &serde_json::Value,
    ) -> Result<HttpReply> {
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer_token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        Self::into_reply(response).await
    }
}

pub(crate) fn truncate_for_error(body: &str) -> String {
    const MAX_LEN: usize = 200;
    if body.chars().count() <= MAX_LEN {
        body.to_owned()
    } else {
        format!("{}...", body.chars().take(MAX_LEN).collect::<String>())
    }
}
