use anyhow::Result;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::SessionCredentials;

/// Sole owner of the session tokens.
///
/// Empty strings are treated the same as absent tokens.
pub trait CredentialStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    /// Remember-me flag of the current session; `false` when logged out.
    fn remember(&self) -> bool;
    fn set_tokens(&self, access: &str, refresh: &str, remember: bool) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Storage that survives process restarts.
pub trait DurableBackend: Send + Sync {
    fn load(&self) -> Result<Option<SessionCredentials>>;
    fn save(&self, credentials: &SessionCredentials) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// In-memory session with an optional durable copy.
///
/// Sessions set with `remember = true` are written through to the durable
/// backend; sessions without it live only for the process lifetime and any
/// older durable copy is removed.
pub struct TokenStore {
    current: RwLock<Option<SessionCredentials>>,
    durable: Option<Box<dyn DurableBackend>>,
}

impl TokenStore {
    pub fn in_memory() -> Self {
        Self {
            current: RwLock::new(None),
            durable: None,
        }
    }

    /// Open a store backed by `backend`, restoring a remembered session.
    ///
    /// A durable copy that cannot be read is discarded rather than failing
    /// startup; the user simply has to log in again.
    pub fn open(backend: impl DurableBackend + 'static) -> Self {
        let restored = match backend.load() {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable stored session");
                if let Err(e) = backend.clear() {
                    warn!(error = %e, "Failed to remove unreadable stored session");
                }
                None
            }
        };
        if restored.is_some() {
            debug!("Restored remembered session");
        }
        Self {
            current: RwLock::new(restored),
            durable: Some(Box::new(backend)),
        }
    }

    pub fn credentials(&self) -> Option<SessionCredentials> {
        self.current.read().clone()
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl CredentialStore for TokenStore {
    fn access_token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .and_then(|c| non_empty(&c.access_token))
    }

    fn refresh_token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .and_then(|c| non_empty(&c.refresh_token))
    }

    fn remember(&self) -> bool {
        self.current.read().as_ref().is_some_and(|c| c.remember)
    }

    fn set_tokens(&self, access: &str, refresh: &str, remember: bool) -> Result<()> {
        let credentials = SessionCredentials::new(access, refresh, remember);
        *self.current.write() = Some(credentials.clone());

        if let Some(ref durable) = self.durable {
            if remember {
                durable.save(&credentials)?;
            } else {
                durable.clear()?;
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.current.write() = None;
        if let Some(ref durable) = self.durable {
            durable.clear()?;
        }
        Ok(())
    }
}
