//! The network seam of the gateway.
//!
//! The gateway never talks to reqwest directly; it hands a prepared
//! [`HttpRequest`] to a [`Transport`] and gets back either the raw status and
//! body or a classified network failure.

use std::error::Error as _;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client};
use thiserror::Error;
use tracing::debug;

use super::{HttpRequest, MultipartBody};
use crate::api::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Timeout,
    ConnectionRefused,
    /// DNS failure or host unreachable
    Unreachable,
    Other,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub kind: NetworkErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err.kind {
            NetworkErrorKind::Timeout => ApiError::Timeout("Request timed out".to_string()),
            NetworkErrorKind::ConnectionRefused => ApiError::ConnectionRefused(
                "Connection refused, check that the server is running".to_string(),
            ),
            NetworkErrorKind::Unreachable => {
                ApiError::NetworkUnreachable("Network connection failed".to_string())
            }
            NetworkErrorKind::Other => ApiError::Unknown(format!("Network error: {}", err.message)),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one HTTP exchange. Non-2xx statuses are returned as responses,
    /// not errors; only failures to get a response at all are errors.
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError>;
}

/// Production transport backed by a shared `reqwest::Client`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn classify(err: &reqwest::Error) -> NetworkErrorKind {
        if err.is_timeout() {
            return NetworkErrorKind::Timeout;
        }
        if err.is_connect() {
            let mut source = err.source();
            while let Some(inner) = source {
                if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                    if io.kind() == std::io::ErrorKind::ConnectionRefused {
                        return NetworkErrorKind::ConnectionRefused;
                    }
                }
                source = inner.source();
            }
            return NetworkErrorKind::Unreachable;
        }
        NetworkErrorKind::Other
    }

    fn to_form(body: &MultipartBody) -> Result<Form, TransportError> {
        let mut form = Form::new();
        for (name, value) in &body.fields {
            form = form.text(name.clone(), value.clone());
        }
        for file in &body.files {
            let part = Part::bytes(file.bytes.clone())
                .file_name(file.file_name.clone())
                .mime_str(&file.content_type)
                .map_err(|e| {
                    TransportError::new(
                        NetworkErrorKind::Other,
                        format!("Invalid content type for {}: {e}", file.file_name),
                    )
                })?;
            form = form.part(file.field.clone(), part);
        }
        Ok(form)
    }

    fn to_transport_error(err: reqwest::Error) -> TransportError {
        TransportError::new(Self::classify(&err), err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout)
            .header(header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref form) = request.multipart {
            builder = builder.multipart(Self::to_form(form)?);
        } else if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(Self::to_transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(Self::to_transport_error)?;

        debug!(method = %request.method, url = %request.url, status, "HTTP exchange complete");
        Ok(RawResponse { status, body })
    }
}
