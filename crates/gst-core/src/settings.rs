//! # GST Integration Settings
//!
//! Settings are stored as active `setting_key` / `setting_value` rows and
//! resolved per request. Each key falls back to an environment variable
//! named after the uppercased key (`gst_username` → `GST_USERNAME`) so a
//! sandbox can be bootstrapped before anyone has saved settings.
//!
//! Resolution order per field: non-blank row value → non-blank env var →
//! built-in default.

use std::collections::HashMap;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::error::SettingsError;

/// Setting keys as stored in the settings table.
pub mod keys {
    pub const BASE_URL: &str = "gst_api_base_url";
    pub const USERNAME: &str = "gst_username";
    pub const PASSWORD: &str = "gst_password";
    pub const CLIENT_ID: &str = "gst_client_id";
    pub const CLIENT_SECRET: &str = "gst_client_secret";
    pub const ENVIRONMENT: &str = "gst_environment";
    pub const COMPANY_GSTIN: &str = "company_gstin";
    pub const COMPANY_LEGAL_NAME: &str = "company_legal_name";
    pub const COMPANY_TRADE_NAME: &str = "company_trade_name";
    pub const COMPANY_ADDRESS1: &str = "company_address1";
    pub const COMPANY_ADDRESS2: &str = "company_address2";
    pub const COMPANY_LOCATION: &str = "company_location";
    pub const COMPANY_PINCODE: &str = "company_pincode";
    pub const COMPANY_STATE_CODE: &str = "company_state_code";
    pub const COMPANY_PHONE: &str = "company_phone";
    pub const COMPANY_EMAIL: &str = "company_email";
    pub const RETRY_ATTEMPTS: &str = "gst_retry_attempts";
    pub const TIMEOUT_MS: &str = "gst_timeout_ms";
    pub const RATE_LIMIT: &str = "gst_rate_limit";

    /// Every recognised key, in display order.
    pub const ALL: &[&str] = &[
        BASE_URL,
        USERNAME,
        PASSWORD,
        CLIENT_ID,
        CLIENT_SECRET,
        ENVIRONMENT,
        COMPANY_GSTIN,
        COMPANY_LEGAL_NAME,
        COMPANY_TRADE_NAME,
        COMPANY_ADDRESS1,
        COMPANY_ADDRESS2,
        COMPANY_LOCATION,
        COMPANY_PINCODE,
        COMPANY_STATE_CODE,
        COMPANY_PHONE,
        COMPANY_EMAIL,
        RETRY_ATTEMPTS,
        TIMEOUT_MS,
        RATE_LIMIT,
    ];

    /// Keys whose values must never be echoed back or logged.
    pub const SECRET: &[&str] = &[PASSWORD, CLIENT_SECRET];
}

/// Sandbox portal used when no base URL is configured.
pub const SANDBOX_BASE_URL: &str = "https://einv-apisandbox.nic.in";

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RATE_LIMIT: u64 = 50;

/// Target portal environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GstEnvironment {
    Sandbox,
    Production,
}

impl GstEnvironment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

impl std::str::FromStr for GstEnvironment {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "test" => Ok(Self::Sandbox),
            "production" | "prod" => Ok(Self::Production),
            other => Err(SettingsError::UnknownEnvironment(other.to_string())),
        }
    }
}

/// Legal identity of the issuing company (the seller on every invoice).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyProfile {
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

/// Resolved GST integration settings.
///
/// Custom `Debug` redacts the password and client secret. Both are held in
/// [`Zeroizing`] buffers and wiped on drop.
#[derive(Clone)]
pub struct GstSettings {
    pub base_url: String,
    pub username: String,
    pub password: Zeroizing<String>,
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
    pub environment: GstEnvironment,
    pub company: CompanyProfile,
    pub retry_attempts: u32,
    pub timeout: Duration,
    /// Maximum portal calls per hour.
    pub rate_limit_per_hour: u64,
}

impl std::fmt::Debug for GstSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GstSettings")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("environment", &self.environment)
            .field("company", &self.company)
            .field("retry_attempts", &self.retry_attempts)
            .field("timeout", &self.timeout)
            .field("rate_limit_per_hour", &self.rate_limit_per_hour)
            .finish()
    }
}

impl GstSettings {
    /// Resolve settings from stored rows, falling back to process
    /// environment variables.
    pub fn from_rows(rows: &HashMap<String, String>) -> Result<Self, SettingsError> {
        Self::resolve(rows, |name| std::env::var(name).ok())
    }

    /// Resolve settings from stored rows and an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Fails on an unknown environment, an unparseable numeric setting, or
    /// a base URL that is missing in production or does not parse.
    /// Credentials are *not* checked here; see
    /// [`GstSettings::validate_credentials`].
    pub fn resolve(
        rows: &HashMap<String, String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let lookup = |key: &str| -> Option<String> {
            rows.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .or_else(|| {
                    env(&key.to_ascii_uppercase())
                        .map(|v| v.trim().to_string())
                        .filter(|v| !v.is_empty())
                })
        };
        let text = |key: &str| lookup(key).unwrap_or_default();

        let environment = match lookup(keys::ENVIRONMENT) {
            Some(raw) => raw.parse()?,
            None => GstEnvironment::Sandbox,
        };

        let base_url = match (lookup(keys::BASE_URL), environment) {
            (Some(url), _) => url,
            (None, GstEnvironment::Sandbox) => SANDBOX_BASE_URL.to_string(),
            (None, GstEnvironment::Production) => {
                return Err(SettingsError::InvalidBaseUrl {
                    url: String::new(),
                    reason: "production requires an explicit base URL".into(),
                })
            }
        };
        url::Url::parse(&base_url).map_err(|e| SettingsError::InvalidBaseUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;

        let timeout_ms = parse_number(&lookup, keys::TIMEOUT_MS, DEFAULT_TIMEOUT_MS)?;
        let retry_attempts = parse_number(&lookup, keys::RETRY_ATTEMPTS, DEFAULT_RETRY_ATTEMPTS)?;
        let rate_limit_per_hour = parse_number(&lookup, keys::RATE_LIMIT, DEFAULT_RATE_LIMIT)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: text(keys::USERNAME),
            password: Zeroizing::new(text(keys::PASSWORD)),
            client_id: text(keys::CLIENT_ID),
            client_secret: Zeroizing::new(text(keys::CLIENT_SECRET)),
            environment,
            company: CompanyProfile {
                gstin: text(keys::COMPANY_GSTIN).to_ascii_uppercase(),
                legal_name: text(keys::COMPANY_LEGAL_NAME),
                trade_name: text(keys::COMPANY_TRADE_NAME),
                address1: text(keys::COMPANY_ADDRESS1),
                address2: text(keys::COMPANY_ADDRESS2),
                location: text(keys::COMPANY_LOCATION),
                pincode: text(keys::COMPANY_PINCODE),
                state_code: text(keys::COMPANY_STATE_CODE),
                phone: text(keys::COMPANY_PHONE),
                email: text(keys::COMPANY_EMAIL),
            },
            retry_attempts,
            timeout: Duration::from_millis(timeout_ms),
            rate_limit_per_hour,
        })
    }

    /// Check that the credentials needed to authenticate are present.
    pub fn validate_credentials(&self) -> Result<(), SettingsError> {
        if self.username.is_empty() {
            return Err(SettingsError::MissingCredential("username"));
        }
        if self.password.is_empty() {
            return Err(SettingsError::MissingCredential("password"));
        }
        if self.client_id.is_empty() {
            return Err(SettingsError::MissingCredential("client id"));
        }
        Ok(())
    }

    /// Absolute URL of a portal endpoint path.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Company state code, falling back to the GSTIN prefix.
    pub fn company_state_code(&self) -> String {
        if self.company.state_code.is_empty() {
            self.company.gstin.chars().take(2).collect()
        } else {
            self.company.state_code.clone()
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, SettingsError> {
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| SettingsError::InvalidNumber { key, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_without_rows_or_env() {
        let s = GstSettings::resolve(&HashMap::new(), no_env).unwrap();
        assert_eq!(s.base_url, SANDBOX_BASE_URL);
        assert_eq!(s.environment, GstEnvironment::Sandbox);
        assert_eq!(s.rate_limit_per_hour, 50);
        assert_eq!(s.timeout, Duration::from_secs(30));
        assert_eq!(s.retry_attempts, 3);
    }

    #[test]
    fn rows_take_precedence_over_env() {
        let r = rows(&[("gst_username", "row-user"), ("gst_client_id", "")]);
        let env = |name: &str| match name {
            "GST_USERNAME" => Some("env-user".to_string()),
            "GST_CLIENT_ID" => Some("env-client".to_string()),
            _ => None,
        };
        let s = GstSettings::resolve(&r, env).unwrap();
        assert_eq!(s.username, "row-user");
        // Blank row value falls through to the environment.
        assert_eq!(s.client_id, "env-client");
    }

    #[test]
    fn production_without_base_url_is_rejected() {
        let r = rows(&[("gst_environment", "production")]);
        assert!(matches!(
            GstSettings::resolve(&r, no_env),
            Err(SettingsError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn invalid_numeric_setting_is_rejected() {
        let r = rows(&[("gst_rate_limit", "fifty")]);
        assert!(matches!(
            GstSettings::resolve(&r, no_env),
            Err(SettingsError::InvalidNumber { key: "gst_rate_limit", .. })
        ));
    }

    #[test]
    fn missing_credentials_fail_validation() {
        let s = GstSettings::resolve(&rows(&[("gst_username", "u")]), no_env).unwrap();
        assert_eq!(
            s.validate_credentials(),
            Err(SettingsError::MissingCredential("password"))
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let r = rows(&[("gst_password", "hunter2"), ("gst_client_secret", "s3cr3t")]);
        let s = GstSettings::resolve(&r, no_env).unwrap();
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("s3cr3t"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let r = rows(&[("gst_api_base_url", "https://irp.example/api/")]);
        let s = GstSettings::resolve(&r, no_env).unwrap();
        assert_eq!(
            s.endpoint("/eivital/v1.04/auth"),
            "https://irp.example/api/eivital/v1.04/auth"
        );
    }

    #[test]
    fn company_state_falls_back_to_gstin() {
        let r = rows(&[("company_gstin", "27aapfu0939f1zv")]);
        let s = GstSettings::resolve(&r, no_env).unwrap();
        assert_eq!(s.company.gstin, "27AAPFU0939F1ZV");
        assert_eq!(s.company_state_code(), "27");
    }
}
