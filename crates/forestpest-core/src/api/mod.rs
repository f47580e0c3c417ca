//! REST API surface of the pest-control backend.
//!
//! Every response body from the backend is an envelope of the form
//! `{code, message, data}`; `code == 200` is the only success marker, even
//! when the HTTP status is 200.

pub mod client;
pub mod codes;
pub mod endpoints;
pub mod error;

use serde::Deserialize;
use serde_json::Value;

pub use client::ForestApi;
pub use codes::ErrorCode;
pub use error::{ApiError, ErrorKind};

/// Application-level response wrapper used by every endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success.code()
    }
}
