//! In-memory [`ApiTransport`] for exercising the pipeline without a network.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::transport::{ApiTransport, HttpReply};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub url: String,
    pub form: Option<Vec<(String, String)>>,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// Replays queued replies in order; an empty queue behaves like a refused connection.
#[derive(Default)]
pub struct FakeTransport {
    replies: Mutex<VecDeque<HttpReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, status: u16, body: serde_json::Value) {
        self.push_raw(status, body.to_string());
    }

    pub fn push_raw(&self, status: u16, body: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(HttpReply {
                status,
                body: body.into(),
            });
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn respond(&self, request: RecordedRequest) -> Result<HttpReply> {
        let url = request.url.clone();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| anyhow!("connection refused: {url}"))
    }
}

#[async_trait]
impl ApiTransport for FakeTransport {
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpReply> {
        self.respond(RecordedRequest {
            url: url.to_string(),
            form: Some(
                form.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            bearer: None,
            body: None,
        })
    }

    async fn post_json(
        &self,
        url: &str,
        bearer_token: &str,
        body: &serde_json::Value,
    ) -> Result<HttpReply> {
        self.respond(RecordedRequest {
            url: url.to_string(),
            form: None,
            bearer: Some(bearer_token.to_string()),
            body: Some(body.clone()),
        })
    }
}
