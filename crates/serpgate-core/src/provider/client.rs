//! HTTP transport for the data provider

use super::types::{ProviderCredentials, ProviderResponse};
use crate::config::ProviderSettings;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Transport seam between the executor and the provider.
///
/// Implementations map transport-level failures onto the gateway error
/// classes so the retry policy can classify them: HTTP 429 becomes a
/// rate-limit error, 5xx an availability error, other non-success
/// statuses a permanent provider error.
#[async_trait]
pub trait ProviderTransport: Send + Sync + fmt::Debug {
    /// POST one task body to `path` and decode the response envelope
    async fn post(
        &self,
        path: &str,
        body: &Value,
        credentials: &ProviderCredentials,
    ) -> GatewayResult<ProviderResponse>;
}

/// Production transport over reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(settings: &ProviderSettings) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| GatewayError::config(format!("http client build failed: {err}")))?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProviderTransport for HttpTransport {
    async fn post(
        &self,
        path: &str,
        body: &Value,
        credentials: &ProviderCredentials,
    ) -> GatewayResult<ProviderResponse> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(%url, "provider request");

        // The provider expects a task batch: a JSON array of task bodies.
        let response = self
            .http
            .post(&url)
            .basic_auth(&credentials.login, Some(&credentials.password))
            .json(&json!([body]))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers());
            return Err(GatewayError::rate_limited(
                "provider returned HTTP 429",
                retry_after,
            ));
        }
        if status.is_server_error() {
            return Err(GatewayError::unavailable(
                status.as_u16() as u32,
                format!("provider returned HTTP {status}"),
            ));
        }
        if !status.is_success() {
            return Err(GatewayError::provider(
                status.as_u16() as u32,
                format!("provider returned HTTP {status}"),
            ));
        }

        let envelope: ProviderResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::json(format!("malformed provider response: {err}")))?;
        Ok(envelope)
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
