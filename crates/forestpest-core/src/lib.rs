//! Core library for the forest pest-control client.
//!
//! The center of this crate is the [`Gateway`]: every call to the REST
//! backend goes through it so that bearer tokens are attached, failures are
//! classified uniformly, and an expired access token is renewed exactly once
//! no matter how many requests notice it at the same time.
//!
//! - [`api`]: error taxonomy, application code table, endpoint catalogue and
//!   the thin per-endpoint [`ForestApi`]
//! - [`auth`]: credential storage, token inspection, session listener
//! - [`gateway`]: request pipeline with single-flight token refresh
//! - [`config`]: environment profiles and persisted client configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod gateway;

pub use api::{ApiError, ErrorCode, ErrorKind, ForestApi};
pub use auth::{CredentialStore, LogListener, SessionListener, TokenStore};
pub use config::{Config, Environment, GatewayConfig};
pub use gateway::{ApiRequest, Gateway, ReqwestTransport, Transport};
