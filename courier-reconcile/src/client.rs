//! Status query client.
//!
//! [`StatusQuery`] is the seam between the engine and the provider's
//! delivery-status endpoint. Implementations never fail: anything other
//! than a clean answer is reported as `None` and the engine retries later.

use std::time::Duration;

use async_trait::async_trait;
use courier_common::{
    MessageStatus, StatusUpdate,
    chrono::{DateTime, Utc},
    tracing,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, ReconcileError};

/// Queries the current delivery status of one message
#[async_trait]
pub trait StatusQuery: Send + Sync + std::fmt::Debug {
    /// Current status of `external_id`, or `None` if it could not be
    /// determined
    async fn query_status(
        &self,
        external_id: &str,
        destination_address: &str,
    ) -> Option<StatusUpdate>;
}

const fn default_timeout_secs() -> u64 {
    10
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8080/v1/status".to_string()
}

/// Configuration for [`HttpStatusClient`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusClientConfig {
    /// URL the status queries are posted to
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-call timeout (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sent as a bearer token when present
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for StatusClientConfig {
    fn default() -> Self {
        Self::new(default_endpoint())
    }
}

impl StatusClientConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusRequest<'a> {
    external_id: &'a str,
    destination_address: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatusResponse {
    Status {
        status: String,
        #[serde(default)]
        error_code: Option<String>,
        #[serde(default)]
        receive_date: Option<DateTime<Utc>>,
    },
    Failure {
        error: serde_json::Value,
    },
}

/// Status client for a JSON-over-HTTP provider endpoint
///
/// Posts `{"external_id", "destination_address"}` and expects either
/// `{"status", "error_code"?, "receive_date"?}` or `{"error"}` back.
#[derive(Debug, Clone)]
pub struct HttpStatusClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStatusClient {
    /// # Errors
    /// Returns [`ReconcileError::Configuration`] if the API key is not a valid
    /// header value or the HTTP client cannot be built
    pub fn new(config: &StatusClientConfig) -> Result<Self, ReconcileError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                ReconcileError::Configuration(format!("invalid API key header value: {e}"))
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ReconcileError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Query the endpoint, keeping the reason for any failure
    ///
    /// # Errors
    /// Any transport failure, non-success response, explicit failure signal
    /// or unrecognised payload
    pub async fn fetch(
        &self,
        external_id: &str,
        destination_address: &str,
    ) -> Result<StatusUpdate, QueryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&StatusRequest {
                external_id,
                destination_address,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let payload: StatusResponse =
            serde_json::from_slice(&body).map_err(|e| QueryError::Malformed(e.to_string()))?;

        match payload {
            StatusResponse::Failure { error } => Err(QueryError::Rejected(match error {
                serde_json::Value::String(message) => message,
                other => other.to_string(),
            })),
            StatusResponse::Status {
                status,
                error_code,
                receive_date,
            } => {
                let status = parse_provider_status(&status)?;
                let mut update = StatusUpdate::new(external_id, destination_address, status);
                update.error_code = error_code;
                update.receive_date = receive_date;
                Ok(update)
            }
        }
    }
}

/// The provider only ever reports these three states
fn parse_provider_status(status: &str) -> Result<MessageStatus, QueryError> {
    match status.parse::<MessageStatus>() {
        Ok(status @ (MessageStatus::Sending | MessageStatus::Delivered | MessageStatus::Failed)) => {
            Ok(status)
        }
        _ => Err(QueryError::Malformed(format!("unknown status '{status}'"))),
    }
}

#[async_trait]
impl StatusQuery for HttpStatusClient {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn query_status(
        &self,
        external_id: &str,
        destination_address: &str,
    ) -> Option<StatusUpdate> {
        match self.fetch(external_id, destination_address).await {
            Ok(update) => {
                tracing::debug!(%external_id, status = %update.status, "Status query answered");
                Some(update)
            }
            Err(e) => {
                tracing::warn!(%external_id, error = %e, "Status query failed");
                None
            }
        }
    }
}
