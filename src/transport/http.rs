//! HTTP bridge to the remote command API

use super::traits::{CommandSource, InboundCommand, ResultSink, TransportError};
use async_trait::async_trait;
use reqwest::StatusCode;
use shadow_shared::ResultEnvelope;
use std::time::Duration;

/// Bearer-authenticated client for `/api/command-queue` and `/api/command-results`
#[derive(Clone)]
pub struct HttpBridge {
    base_url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl HttpBridge {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.auth_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.auth_token)
        }
    }
}

#[async_trait]
impl CommandSource for HttpBridge {
    async fn fetch(&self) -> Result<Vec<InboundCommand>, TransportError> {
        let resp = self
            .authorize(self.client.get(self.url("/api/command-queue")))
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => resp
                .json::<Vec<InboundCommand>>()
                .await
                .map_err(|e| TransportError::Body(e.to_string())),
            StatusCode::NO_CONTENT => Ok(Vec::new()),
            other => Err(TransportError::Status {
                status: other.as_u16(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }
}

#[async_trait]
impl ResultSink for HttpBridge {
    async fn deliver(&self, envelope: &ResultEnvelope) -> Result<(), TransportError> {
        let resp = self
            .authorize(self.client.post(self.url("/api/command-results")))
            .json(envelope)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::Status {
                status: resp.status().as_u16(),
            })
        }
    }
}
