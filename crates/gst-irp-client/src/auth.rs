//! # Portal Auth Token Cache
//!
//! [`AuthManager`] owns the process's portal token. It is constructed once
//! and shared by `Arc`; there is no global.
//!
//! The slot is a `tokio::sync::Mutex` held across the refresh call, so
//! concurrent callers that find the token absent or expired queue behind a
//! single refresh and then reuse its result instead of each authenticating.
//!
//! A cached token is only reused for the same base URL, username, and
//! client id it was issued for. Changing settings forces a new login.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use gst_core::GstSettings;

use crate::error::GstError;

/// Lifetime assumed for an issued token.
pub const TOKEN_TTL_HOURS: i64 = 5;

/// Identity a token was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenScope {
    base_url: String,
    username: String,
    client_id: String,
}

impl TokenScope {
    pub fn of(settings: &GstSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            username: settings.username.clone(),
            client_id: settings.client_id.clone(),
        }
    }
}

struct CachedToken {
    token: Zeroizing<String>,
    expires_at: DateTime<Utc>,
    scope: TokenScope,
}

impl CachedToken {
    fn usable_for(&self, scope: &TokenScope, now: DateTime<Utc>) -> bool {
        self.scope == *scope && now < self.expires_at
    }
}

/// Single-flight token cache.
pub struct AuthManager {
    slot: Mutex<Option<CachedToken>>,
    ttl: Duration,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("slot", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Default for AuthManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthManager {
    pub fn new() -> Self {
        Self::with_ttl(Duration::hours(TOKEN_TTL_HOURS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }

    /// Return the cached token for `scope`, or run `refresh` to obtain one.
    ///
    /// With `force_refresh` the cache is bypassed. A failed refresh leaves
    /// the slot as it was.
    pub async fn token_with<F, Fut>(
        &self,
        scope: TokenScope,
        force_refresh: bool,
        refresh: F,
    ) -> Result<String, GstError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, GstError>>,
    {
        let mut slot = self.slot.lock().await;

        if !force_refresh {
            if let Some(cached) = slot.as_ref() {
                if cached.usable_for(&scope, Utc::now()) {
                    tracing::debug!("reusing cached portal token");
                    return Ok(cached.token.to_string());
                }
            }
        }

        let token = refresh().await?;
        let expires_at = Utc::now() + self.ttl;
        tracing::info!(%expires_at, "portal token refreshed");
        *slot = Some(CachedToken {
            token: Zeroizing::new(token.clone()),
            expires_at,
            scope,
        });
        Ok(token)
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        if self.slot.lock().await.take().is_some() {
            tracing::info!("portal token invalidated");
        }
    }

    /// Expiry of the cached token, if one is held.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.slot.lock().await.as_ref().map(|c| c.expires_at)
    }
}
