//! # GST Settings Service
//!
//! Read-through cache over the `gst_settings` rows. Non-secret rows are
//! cached as a JSON object under [`SETTINGS_CACHE_KEY`] for five minutes,
//! then resolved into [`GstSettings`] (with environment variable fallback)
//! on every call.
//!
//! Secret rows ([`keys::SECRET`]) never reach the shared cache. They are
//! held in process memory for the same TTL and dropped on update.
//!
//! The cache is an optimization only: read and write failures are logged
//! and the store is consulted directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use gst_core::settings::keys;
use gst_core::{GstSettings, SettingsError};

use crate::cache::Cache;
use crate::db::{InvoiceStore, StoreError};

pub const SETTINGS_CACHE_KEY: &str = "settings:gst";
pub const SETTINGS_CACHE_PATTERN: &str = "settings:*";
pub const SETTINGS_TTL_SECS: u64 = 300;

/// Settings could not be read or resolved.
#[derive(Debug, thiserror::Error)]
pub enum LoadSettingsError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Invalid(#[from] SettingsError),
}

#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn InvoiceStore>,
    cache: Arc<dyn Cache>,
    secrets: Arc<Mutex<Option<SecretRows>>>,
}

struct SecretRows {
    rows: HashMap<String, String>,
    loaded_at: Instant,
}

fn is_secret(key: &str) -> bool {
    keys::SECRET.contains(&key)
}

impl std::fmt::Debug for SettingsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsService").finish_non_exhaustive()
    }
}

impl SettingsService {
    pub fn new(store: Arc<dyn InvoiceStore>, cache: Arc<dyn Cache>) -> Self {
        Self {
            store,
            cache,
            secrets: Arc::new(Mutex::new(None)),
        }
    }

    /// Active settings rows, from cache when warm.
    pub async fn rows(&self) -> Result<HashMap<String, String>, StoreError> {
        if let (Some(mut rows), Some(secrets)) = (self.cached_rows().await, self.cached_secrets()) {
            rows.extend(secrets);
            return Ok(rows);
        }

        let rows = self.store.load_settings().await?;
        let (secrets, public): (HashMap<_, _>, HashMap<_, _>) =
            rows.iter().map(|(k, v)| (k.clone(), v.clone())).partition(|(k, _)| is_secret(k));
        *self.secrets.lock() = Some(SecretRows {
            rows: secrets,
            loaded_at: Instant::now(),
        });
        match serde_json::to_string(&public) {
            Ok(raw) => {
                if let Err(e) = self
                    .cache
                    .set_with_expiry(SETTINGS_CACHE_KEY, &raw, SETTINGS_TTL_SECS)
                    .await
                {
                    tracing::warn!(error = %e, "settings cache write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "settings not cacheable"),
        }
        Ok(rows)
    }

    async fn cached_rows(&self) -> Option<HashMap<String, String>> {
        match self.cache.get(SETTINGS_CACHE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(rows) => Some(rows),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unreadable cached settings");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "settings cache read failed");
                None
            }
        }
    }

    fn cached_secrets(&self) -> Option<HashMap<String, String>> {
        let guard = self.secrets.lock();
        guard
            .as_ref()
            .filter(|s| s.loaded_at.elapsed() < Duration::from_secs(SETTINGS_TTL_SECS))
            .map(|s| s.rows.clone())
    }

    /// Resolve effective settings.
    pub async fn load(&self) -> Result<GstSettings, LoadSettingsError> {
        let rows = self.rows().await?;
        Ok(GstSettings::from_rows(&rows)?)
    }

    /// Upsert rows, then drop every cached settings entry.
    ///
    /// Invalidation is best effort; a failure leaves stale values for at
    /// most the cache TTL.
    pub async fn update(&self, rows: &HashMap<String, String>) -> Result<(), StoreError> {
        self.store.upsert_settings(rows).await?;
        self.secrets.lock().take();
        match self.cache.delete_matching(SETTINGS_CACHE_PATTERN).await {
            Ok(removed) => tracing::info!(keys = rows.len(), removed, "GST settings updated"),
            Err(e) => tracing::warn!(error = %e, "settings updated but cache invalidation failed"),
        }
        Ok(())
    }
}

/// Effective settings as returned by the API. Secrets are reduced to a
/// "configured" flag.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    pub base_url: String,
    pub environment: &'static str,
    pub username: String,
    pub password_configured: bool,
    pub client_id: String,
    pub client_secret_configured: bool,
    pub company: CompanyView,
    pub retry_attempts: u32,
    pub timeout_ms: u64,
    pub rate_limit_per_hour: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyView {
    pub gstin: String,
    pub legal_name: String,
    pub trade_name: String,
    pub address1: String,
    pub address2: String,
    pub location: String,
    pub pincode: String,
    pub state_code: String,
    pub phone: String,
    pub email: String,
}

impl From<&GstSettings> for SettingsView {
    fn from(s: &GstSettings) -> Self {
        let company = &s.company;
        Self {
            base_url: s.base_url.clone(),
            environment: s.environment.as_str(),
            username: s.username.clone(),
            password_configured: !s.password.is_empty(),
            client_id: s.client_id.clone(),
            client_secret_configured: !s.client_secret.is_empty(),
            company: CompanyView {
                gstin: company.gstin.clone(),
                legal_name: company.legal_name.clone(),
                trade_name: company.trade_name.clone(),
                address1: company.address1.clone(),
                address2: company.address2.clone(),
                location: company.location.clone(),
                pincode: company.pincode.clone(),
                state_code: s.company_state_code(),
                phone: company.phone.clone(),
                email: company.email.clone(),
            },
            retry_attempts: s.retry_attempts,
            timeout_ms: u64::try_from(s.timeout.as_millis()).unwrap_or(u64::MAX),
            rate_limit_per_hour: s.rate_limit_per_hour,
        }
    }
}

/// Keys accepted by the settings update route.
pub fn is_known_key(key: &str) -> bool {
    keys::ALL.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::MemoryInvoiceStore;

    fn service() -> (SettingsService, MemoryInvoiceStore, MemoryCache) {
        let store = MemoryInvoiceStore::new();
        let cache = MemoryCache::new();
        let svc = SettingsService::new(Arc::new(store.clone()), Arc::new(cache.clone()));
        (svc, store, cache)
    }

    fn rows(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn rows_are_cached_after_first_read() {
        let (svc, store, cache) = service();
        store
            .upsert_settings(&rows(&[(keys::USERNAME, "first")]))
            .await
            .unwrap();

        assert_eq!(svc.rows().await.unwrap()[keys::USERNAME], "first");
        assert!(cache.get(SETTINGS_CACHE_KEY).await.unwrap().is_some());

        // Bypass the service so the cache is not invalidated.
        store
            .upsert_settings(&rows(&[(keys::USERNAME, "second")]))
            .await
            .unwrap();
        assert_eq!(svc.rows().await.unwrap()[keys::USERNAME], "first");
    }

    #[tokio::test]
    async fn secrets_are_kept_out_of_the_shared_cache() {
        let (svc, store, cache) = service();
        store
            .upsert_settings(&rows(&[
                (keys::USERNAME, "ledgerline_api"),
                (keys::PASSWORD, "hunter2"),
                (keys::CLIENT_SECRET, "csecret-42"),
            ]))
            .await
            .unwrap();

        svc.rows().await.unwrap();
        let raw = cache.get(SETTINGS_CACHE_KEY).await.unwrap().unwrap();
        assert!(raw.contains("ledgerline_api"));
        assert!(!raw.contains("hunter2"));
        assert!(!raw.contains("csecret-42"));
        assert!(!raw.contains(keys::PASSWORD));

        // Warm read still resolves the secrets.
        let warm = svc.rows().await.unwrap();
        assert_eq!(warm[keys::PASSWORD], "hunter2");
        assert_eq!(warm[keys::CLIENT_SECRET], "csecret-42");
    }

    #[tokio::test]
    async fn shared_cache_without_local_secrets_reloads_from_store() {
        let (svc, store, cache) = service();
        store
            .upsert_settings(&rows(&[(keys::USERNAME, "u"), (keys::PASSWORD, "p")]))
            .await
            .unwrap();
        // Filled by another instance.
        cache
            .set_with_expiry(SETTINGS_CACHE_KEY, r#"{"gst_username":"u"}"#, 300)
            .await
            .unwrap();
        assert_eq!(svc.rows().await.unwrap()[keys::PASSWORD], "p");
    }

    #[tokio::test]
    async fn update_replaces_cached_secrets() {
        let (svc, _store, _cache) = service();
        svc.update(&rows(&[(keys::PASSWORD, "old")])).await.unwrap();
        assert_eq!(svc.rows().await.unwrap()[keys::PASSWORD], "old");

        svc.update(&rows(&[(keys::PASSWORD, "new")])).await.unwrap();
        assert_eq!(svc.rows().await.unwrap()[keys::PASSWORD], "new");
    }

    #[tokio::test]
    async fn update_invalidates_cache() {
        let (svc, _store, cache) = service();
        svc.update(&rows(&[(keys::USERNAME, "first")])).await.unwrap();
        svc.rows().await.unwrap();

        svc.update(&rows(&[(keys::USERNAME, "second")])).await.unwrap();
        assert!(cache.get(SETTINGS_CACHE_KEY).await.unwrap().is_none());
        assert_eq!(svc.rows().await.unwrap()[keys::USERNAME], "second");
    }

    #[tokio::test]
    async fn unreadable_cache_entry_falls_back_to_store() {
        let (svc, store, cache) = service();
        store
            .upsert_settings(&rows(&[(keys::CLIENT_ID, "abc")]))
            .await
            .unwrap();
        cache
            .set_with_expiry(SETTINGS_CACHE_KEY, "not json", 300)
            .await
            .unwrap();
        assert_eq!(svc.rows().await.unwrap()[keys::CLIENT_ID], "abc");
    }

    #[tokio::test]
    async fn view_redacts_secrets() {
        let (svc, _store, _cache) = service();
        svc.update(&rows(&[
            (keys::BASE_URL, "https://portal.example"),
            (keys::PASSWORD, "hunter2"),
            (keys::COMPANY_GSTIN, "27AAPFU0939F1ZV"),
        ]))
        .await
        .unwrap();

        let settings = svc.load().await.unwrap();
        let view = SettingsView::from(&settings);
        assert!(view.password_configured);
        assert_eq!(view.company.state_code, "27");

        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn known_keys() {
        assert!(is_known_key(keys::RATE_LIMIT));
        assert!(!is_known_key("gst_unknown"));
    }
}
