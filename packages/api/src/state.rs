use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use store::{CredentialStore, NoteStore, StoreResult};

use crate::audit::AuditSink;
use crate::auth::TokenService;
use crate::error::ApiError;

/// Shared state injected into all handlers. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<dyn CredentialStore>,
    pub notes: Arc<dyn NoteStore>,
    pub tokens: Arc<TokenService>,
    /// Whether session cookies carry the `Secure` attribute.
    pub secure_cookie: bool,
    /// Deadline for each store call made by a handler.
    pub store_timeout: Duration,
    pub audit: Option<AuditSink>,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, tokens: TokenService) -> Self
    where
        S: CredentialStore + NoteStore + 'static,
    {
        Self {
            credentials: store.clone(),
            notes: store,
            tokens: Arc::new(tokens),
            secure_cookie: false,
            store_timeout: Duration::from_secs(5),
            audit: None,
        }
    }

    pub fn with_secure_cookie(mut self, secure: bool) -> Self {
        self.secure_cookie = secure;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_audit(mut self, audit: Option<AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Run a store call under the configured deadline.
    pub async fn store<T, F>(&self, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "store call timed out"
                );
                Err(ApiError::StoreUnavailable)
            }
        }
    }
}
