//! Bearer token cache and refresh

use std::sync::Arc;
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use crate::transport::Transport;
use crate::{Error, Result};

/// Header carrying the subscription key to the token endpoint
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// One cached credential with its issuance time
#[derive(Debug, Clone)]
struct Token {
    value: String,
    issued_at: Instant,
}

/// Stores the last credential obtained from the token service.
///
/// Refresh is caller-driven; the cache only answers freshness questions and
/// records replacements. Time is injected so freshness is testable.
#[derive(Debug, Default)]
pub struct TokenCache {
    token: Option<Token>,
}

impl TokenCache {
    /// Create an empty cache
    #[must_use]
    pub const fn new() -> Self {
        Self { token: None }
    }

    /// Whether a refresh is required: no token yet, or the token has been
    /// held for at least `ttl` (boundary inclusive)
    #[must_use]
    pub fn needs_refresh(&self, now: Instant, ttl: Duration) -> bool {
        self.token
            .as_ref()
            .is_none_or(|t| now.duration_since(t.issued_at) >= ttl)
    }

    /// Replace the cached token unconditionally
    pub fn store(&mut self, value: String, now: Instant) {
        self.token = Some(Token {
            value,
            issued_at: now,
        });
    }

    /// The cached credential, if any
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.value.as_str())
    }
}

/// Fetches and caches bearer tokens for the speech endpoints.
///
/// The cache sits behind a mutex held across the refresh call, so
/// overlapping callers that both observe a stale token perform a single
/// refresh: the second caller finds the fresh value when it acquires the
/// lock.
pub struct TokenProvider {
    transport: Arc<dyn Transport>,
    token_url: String,
    subscription_key: SecretString,
    ttl: Duration,
    cache: Mutex<TokenCache>,
}

impl TokenProvider {
    /// Create a provider for the given token endpoint
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        token_url: String,
        subscription_key: SecretString,
        ttl: Duration,
    ) -> Self {
        Self {
            transport,
            token_url,
            subscription_key,
            ttl,
            cache: Mutex::new(TokenCache::new()),
        }
    }

    /// A fresh bearer token, refreshed from the token endpoint when the
    /// cached one is stale.
    ///
    /// A failed or empty refresh leaves any previously cached token in
    /// place; the next call retries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialUnavailable`] when the refresh fails or
    /// the endpoint returns an empty body.
    pub async fn bearer(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;

        if cache.needs_refresh(Instant::now(), self.ttl) {
            let value = self.fetch().await?;
            cache.store(value, Instant::now());
            tracing::info!("bearer token refreshed");
        }

        cache
            .value()
            .map(ToString::to_string)
            .ok_or_else(|| Error::CredentialUnavailable("no token cached".to_string()))
    }

    /// POST to the token endpoint; the body is an opaque bearer token
    async fn fetch(&self) -> Result<String> {
        let headers = [(
            SUBSCRIPTION_KEY_HEADER,
            self.subscription_key.expose_secret().to_string(),
        )];

        let body = self
            .transport
            .post(&self.token_url, &headers, Vec::new())
            .await
            .map_err(|e| Error::CredentialUnavailable(format!("token refresh failed: {e}")))?;

        let token = String::from_utf8_lossy(&body).trim().to_string();
        if token.is_empty() {
            return Err(Error::CredentialUnavailable(
                "token endpoint returned an empty body".to_string(),
            ));
        }

        Ok(token)
    }
}
