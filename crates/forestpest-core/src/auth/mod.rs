//! Authentication module for managing session tokens.
//!
//! This module provides:
//! - `CredentialStore`: the seam through which the gateway reads and replaces tokens
//! - `TokenStore`: in-memory session with an optional durable copy
//! - `SessionFile` / `KeychainBackend`: durable copies on disk or in the OS keychain
//! - `token`: JWT expiry inspection
//! - `SessionListener`: notified when the session is invalidated

pub mod credentials;
pub mod listener;
pub mod session;
pub mod store;
pub mod token;

pub use credentials::KeychainBackend;
pub use listener::{LogListener, SessionListener};
pub use session::{SessionCredentials, SessionFile};
pub use store::{CredentialStore, DurableBackend, TokenStore};
pub use token::TokenClaims;
