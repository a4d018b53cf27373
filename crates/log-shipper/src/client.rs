// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP implementation of [`LogsApi`].
//!
//! Speaks the JSON 1.1 protocol of the CloudWatch Logs API: every operation
//! is a `POST` to the service endpoint, named by the `X-Amz-Target` header.
//! Errors come back as `{"__type": "...#Code", "message": "..."}` documents.
//!
//! Credentials are not acquired here. A [`RequestSigner`] adds whatever
//! authentication the deployment needs before a request is sent;
//! [`UnsignedRequests`] suits local emulators and signing proxies.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use std::{future::Future, pin::Pin};
use tokio::sync::OnceCell;
use tracing::{debug, error};

use crate::api::{
    CreateLogGroupRequest, CreateLogStreamRequest, LogsApi, PutLogEventsRequest,
    PutLogEventsResponse,
};
use crate::config::ShipperConfig;
use crate::error::{ApiError, ShipperError};

/// API version prefix of every `X-Amz-Target` value.
pub const TARGET_PREFIX: &str = "Logs_20140328";

pub const AMZ_JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

const AMZ_TARGET: &str = "x-amz-target";
const AMZN_ERROR_TYPE: &str = "x-amzn-errortype";

/// Adds authentication to an outgoing request.
#[async_trait]
pub trait RequestSigner: Send + Sync {
    /// `headers` already carries the target and content type of the call.
    async fn sign(
        &self,
        endpoint: &str,
        body: &[u8],
        headers: &mut HeaderMap,
    ) -> Result<(), ApiError>;
}

/// Sends requests as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsignedRequests;

#[async_trait]
impl RequestSigner for UnsignedRequests {
    async fn sign(&self, _: &str, _: &[u8], _: &mut HeaderMap) -> Result<(), ApiError> {
        Ok(())
    }
}

pub type CredentialResolverFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync>;

/// Sets one header to a credential, e.g. the token expected by a signing proxy.
///
/// A dynamic credential is resolved on first use and cached afterwards.
#[derive(Clone)]
pub enum HeaderSigner {
    Static {
        header: HeaderName,
        value: String,
    },
    Dynamic {
        header: HeaderName,
        resolver_fn: CredentialResolverFn,
        value: Arc<OnceCell<String>>,
    },
}

impl HeaderSigner {
    pub fn new_from_static(header: HeaderName, value: &str) -> Self {
        Self::Static {
            header,
            value: value.to_string(),
        }
    }

    pub fn new_from_resolver(header: HeaderName, resolver_fn: CredentialResolverFn) -> Self {
        Self::Dynamic {
            header,
            resolver_fn,
            value: Arc::new(OnceCell::new()),
        }
    }

    async fn credential(&self) -> (&HeaderName, &str) {
        match self {
            Self::Static { header, value } => (header, value.as_str()),
            Self::Dynamic {
                header,
                resolver_fn,
                value,
            } => {
                let value = value.get_or_init(|| async { (resolver_fn)().await }).await;
                (header, value.as_str())
            }
        }
    }
}

impl Debug for HeaderSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HeaderSigner")
    }
}

#[async_trait]
impl RequestSigner for HeaderSigner {
    async fn sign(&self, _: &str, _: &[u8], headers: &mut HeaderMap) -> Result<(), ApiError> {
        let (header, value) = self.credential().await;
        let value = HeaderValue::from_str(value).map_err(|e| ApiError::Signing(e.to_string()))?;
        headers.insert(header.clone(), value);
        Ok(())
    }
}

/// Builds the HTTP client used to reach the remote service.
///
/// An invalid proxy configuration is logged and the client falls back to a
/// direct connection.
#[must_use]
pub fn get_client(config: &ShipperConfig) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "SHIPPER | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "SHIPPER | Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    config: &ShipperConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(https_uri.clone())?;
            client = client.proxy(proxy);
        }
    }

    Ok(client.build()?)
}

/// [`LogsApi`] over HTTP.
pub struct HttpLogsClient {
    client: reqwest::Client,
    endpoint: String,
    signer: Arc<dyn RequestSigner>,
}

impl HttpLogsClient {
    /// Fails when the configuration names neither an endpoint nor a region.
    pub fn new(config: &ShipperConfig, signer: Arc<dyn RequestSigner>) -> Result<Self, ShipperError> {
        Ok(Self {
            client: get_client(config),
            endpoint: config.endpoint_url()?,
            signer,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<T: Serialize + Sync>(&self, operation: &str, request: &T) -> Result<Vec<u8>, ApiError> {
        let body = serde_json::to_vec(request).map_err(|e| ApiError::Transport(e.to_string()))?;

        let mut headers = HeaderMap::new();
        let target = HeaderValue::from_str(&format!("{TARGET_PREFIX}.{operation}"))
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        headers.insert(HeaderName::from_static(AMZ_TARGET), target);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(AMZ_JSON_CONTENT_TYPE));
        self.signer.sign(&self.endpoint, &body, &mut headers).await?;

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let error_type = response
            .headers()
            .get(AMZN_ERROR_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let payload = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if status.is_success() {
            return Ok(payload.to_vec());
        }
        let error = parse_error(status, error_type.as_deref(), &payload);
        debug!("SHIPPER | {} failed with status {}: {}", operation, status, error);
        Err(error)
    }
}

#[async_trait]
impl LogsApi for HttpLogsClient {
    async fn create_log_group(&self, log_group_name: &str) -> Result<(), ApiError> {
        let request = CreateLogGroupRequest {
            log_group_name: log_group_name.to_string(),
        };
        self.call("CreateLogGroup", &request).await.map(|_| ())
    }

    async fn create_log_stream(
        &self,
        log_group_name: &str,
        log_stream_name: &str,
    ) -> Result<(), ApiError> {
        let request = CreateLogStreamRequest {
            log_group_name: log_group_name.to_string(),
            log_stream_name: log_stream_name.to_string(),
        };
        self.call("CreateLogStream", &request).await.map(|_| ())
    }

    async fn put_log_events(
        &self,
        request: &PutLogEventsRequest,
    ) -> Result<PutLogEventsResponse, ApiError> {
        let payload = self.call("PutLogEvents", request).await?;
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Ok(PutLogEventsResponse::default());
        }
        serde_json::from_slice(&payload)
            .map_err(|e| ApiError::Transport(format!("invalid PutLogEvents response: {e}")))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorDocument {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    message: Option<String>,
    /// Some services capitalize the message key.
    #[serde(rename = "Message")]
    capitalized_message: Option<String>,
    #[serde(rename = "expectedSequenceToken")]
    expected_sequence_token: Option<String>,
}

/// Turns a non-success answer into an [`ApiError::Service`].
///
/// The code is the part of `__type` after the last `#`, or the
/// `x-amzn-ErrorType` header up to its first `:`.
fn parse_error(status: StatusCode, error_type_header: Option<&str>, payload: &[u8]) -> ApiError {
    let document: ErrorDocument = serde_json::from_slice(payload).unwrap_or_default();

    let code = document
        .error_type
        .as_deref()
        .map(|t| t.rsplit('#').next().unwrap_or(t))
        .or_else(|| error_type_header.and_then(|h| h.split(':').next()))
        .filter(|code| !code.is_empty())
        .map_or_else(|| status.to_string(), ToString::to_string);
    let message = document
        .message
        .or(document.capitalized_message)
        .unwrap_or_else(|| String::from_utf8_lossy(payload).trim().to_string());

    ApiError::Service {
        code,
        message,
        expected_sequence_token: document.expected_sequence_token,
    }
}
