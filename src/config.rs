use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::LessonForgeError;
use crate::utils::{get_env_with_prefix, parse_list};

/// Main configuration for a LessonForge server
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub billing: BillingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

/// How session tokens are verified.
///
/// `jwks_url` takes precedence over `jwt_secret` when both are set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HS256 shared secret. Never serialized.
    #[serde(skip)]
    pub jwt_secret: Option<SecretString>,
    /// RS256 key set of the identity provider.
    #[serde(default)]
    pub jwks_url: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

impl AuthConfig {
    pub fn is_configured(&self) -> bool {
        self.jwt_secret.is_some() || self.jwks_url.is_some()
    }
}

/// Stripe and quota settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BillingConfig {
    /// Never serialized.
    #[serde(skip)]
    pub stripe_secret_key: Option<SecretString>,
    /// Stripe price ID of the Pro plan used for checkout.
    #[serde(default)]
    pub pro_price_id: String,
    /// Hosts that checkout and portal redirects may point at. Empty allows any HTTPS host.
    #[serde(default)]
    pub allowed_redirect_domains: Vec<String>,
    #[serde(default)]
    pub portal_configuration_id: Option<String>,
    #[serde(default)]
    pub quota: QuotaPolicy,
}

/// Generation limits per tier and the free-tier window arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuotaPolicy {
    /// Generations per billing period for an active subscriber.
    #[serde(default = "default_subscribed_limit")]
    pub subscribed_limit: u32,
    /// Generations per trailing window without an active subscription.
    #[serde(default = "default_free_limit")]
    pub free_limit: u32,
    /// Length of the trailing window used when no subscription exists.
    #[serde(default = "default_free_window_days")]
    pub free_window_days: u32,
    /// Days added to "now" to report the free-tier reset date.
    #[serde(default = "default_free_reset_days")]
    pub free_reset_days: u32,
}

/// Upper bound for the free-tier window and reset lengths.
pub const MAX_QUOTA_DAYS: u32 = 3650;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            subscribed_limit: default_subscribed_limit(),
            free_limit: default_free_limit(),
            free_window_days: default_free_window_days(),
            free_reset_days: default_free_reset_days(),
        }
    }
}

impl QuotaPolicy {
    pub fn free_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.free_window_days))
    }

    pub fn free_reset(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.free_reset_days))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_subscribed_limit() -> u32 {
    30
}

fn default_free_limit() -> u32 {
    10
}

fn default_free_window_days() -> u32 {
    30
}

fn default_free_reset_days() -> u32 {
    1
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.jwt_secret = Some(SecretString::from(secret.into()));
        self
    }

    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.config.auth.jwks_url = Some(url.into());
        self
    }

    pub fn with_stripe_secret_key(mut self, key: impl Into<String>) -> Self {
        self.config.billing.stripe_secret_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_pro_price_id(mut self, price_id: impl Into<String>) -> Self {
        self.config.billing.pro_price_id = price_id.into();
        self
    }

    pub fn with_allowed_redirect_domains(mut self, domains: Vec<String>) -> Self {
        self.config.billing.allowed_redirect_domains = domains;
        self
    }

    pub fn with_portal_configuration_id(mut self, id: impl Into<String>) -> Self {
        self.config.billing.portal_configuration_id = Some(id.into());
        self
    }

    pub fn with_quota(mut self, quota: QuotaPolicy) -> Self {
        self.config.billing.quota = quota;
        self
    }

    /// Load configuration from environment variables with LESSONFORGE_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.config.server.host = host;
        }
        // PORT without prefix is what most hosting platforms inject
        if let Some(port) = get_env_with_prefix("PORT") {
            if let Ok(p) = port.parse() {
                self.config.server.port = p;
            }
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }

        let auth = &mut self.config.auth;
        if let Some(secret) = get_env_with_prefix("JWT_SECRET") {
            auth.jwt_secret = Some(SecretString::from(secret));
        }
        if let Some(url) = get_env_with_prefix("JWKS_URL") {
            auth.jwks_url = Some(url);
        }
        if let Some(issuer) = get_env_with_prefix("JWT_ISSUER") {
            auth.issuer = Some(issuer);
        }
        if let Some(audience) = get_env_with_prefix("JWT_AUDIENCE") {
            auth.audience = Some(audience);
        }

        let billing = &mut self.config.billing;
        if let Some(key) = get_env_with_prefix("STRIPE_SECRET_KEY") {
            billing.stripe_secret_key = Some(SecretString::from(key));
        }
        if let Some(price_id) = get_env_with_prefix("STRIPE_PRO_PRICE_ID") {
            billing.pro_price_id = price_id;
        }
        if let Some(domains) = get_env_with_prefix("ALLOWED_REDIRECT_DOMAINS") {
            billing.allowed_redirect_domains = parse_list(&domains);
        }
        if let Some(id) = get_env_with_prefix("PORTAL_CONFIGURATION_ID") {
            billing.portal_configuration_id = Some(id);
        }
        if let Some(limit) = get_env_with_prefix("SUBSCRIBED_LIMIT") {
            if let Ok(l) = limit.parse() {
                billing.quota.subscribed_limit = l;
            }
        }
        if let Some(limit) = get_env_with_prefix("FREE_LIMIT") {
            if let Ok(l) = limit.parse() {
                billing.quota.free_limit = l;
            }
        }

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if the server address does not parse, the log level
    /// is unknown, the port is zero, or the quota policy has a zero limit or
    /// a free window or reset outside `1..=MAX_QUOTA_DAYS`.
    pub fn build(self) -> crate::error::Result<Config> {
        self.config.server.addr().map_err(|e| {
            LessonForgeError::bad_request(format!(
                "Invalid server address {}:{} - {}",
                self.config.server.host, self.config.server.port, e
            ))
        })?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(LessonForgeError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if self.config.server.port == 0 {
            return Err(LessonForgeError::bad_request(
                "Server port must be greater than 0",
            ));
        }

        let quota = &self.config.billing.quota;
        if quota.subscribed_limit == 0 || quota.free_limit == 0 {
            return Err(LessonForgeError::bad_request(
                "Quota limits must be greater than 0",
            ));
        }
        if !(1..=MAX_QUOTA_DAYS).contains(&quota.free_window_days) {
            return Err(LessonForgeError::bad_request(format!(
                "Free tier window must be between 1 and {} days",
                MAX_QUOTA_DAYS
            )));
        }
        if !(1..=MAX_QUOTA_DAYS).contains(&quota.free_reset_days) {
            return Err(LessonForgeError::bad_request(format!(
                "Free tier reset must be between 1 and {} days",
                MAX_QUOTA_DAYS
            )));
        }

        if let Some(url) = &self.config.auth.jwks_url {
            url::Url::parse(url).map_err(|e| {
                LessonForgeError::bad_request(format!("Invalid JWKS URL {}: {}", url, e))
            })?;
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_default_quota_policy() {
        let quota = QuotaPolicy::default();
        assert_eq!(quota.subscribed_limit, 30);
        assert_eq!(quota.free_limit, 10);
        assert_eq!(quota.free_window(), chrono::Duration::days(30));
        assert_eq!(quota.free_reset(), chrono::Duration::days(1));
    }

    #[test]
    fn test_builder_setters() {
        let config = ConfigBuilder::new()
            .with_host("127.0.0.1")
            .with_port(3000)
            .with_log_level("debug")
            .with_pro_price_id("price_pro")
            .with_stripe_secret_key("sk_test_abc")
            .with_allowed_redirect_domains(vec!["lessonforge.app".to_string()])
            .build()
            .unwrap();

        assert_eq!(config.server.addr().unwrap().port(), 3000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.billing.pro_price_id, "price_pro");
        assert_eq!(
            config
                .billing
                .stripe_secret_key
                .as_ref()
                .map(|k| k.expose_secret().to_string()),
            Some("sk_test_abc".to_string())
        );
        assert_eq!(config.billing.allowed_redirect_domains, vec!["lessonforge.app"]);
    }

    #[test]
    fn test_build_rejects_invalid_log_level() {
        let result = ConfigBuilder::new().with_log_level("verbose").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_zero_port() {
        assert!(ConfigBuilder::new().with_port(0).build().is_err());
    }

    #[test]
    fn test_build_rejects_zero_limits() {
        let quota = QuotaPolicy {
            free_limit: 0,
            ..QuotaPolicy::default()
        };
        assert!(ConfigBuilder::new().with_quota(quota).build().is_err());

        let quota = QuotaPolicy {
            free_window_days: 0,
            ..QuotaPolicy::default()
        };
        assert!(ConfigBuilder::new().with_quota(quota).build().is_err());
    }

    #[test]
    fn test_build_bounds_free_tier_days() {
        for quota in [
            QuotaPolicy {
                free_window_days: u32::MAX,
                ..QuotaPolicy::default()
            },
            QuotaPolicy {
                free_window_days: MAX_QUOTA_DAYS + 1,
                ..QuotaPolicy::default()
            },
            QuotaPolicy {
                free_reset_days: u32::MAX,
                ..QuotaPolicy::default()
            },
            QuotaPolicy {
                free_reset_days: 0,
                ..QuotaPolicy::default()
            },
        ] {
            assert!(ConfigBuilder::new().with_quota(quota).build().is_err());
        }

        let quota = QuotaPolicy {
            free_window_days: MAX_QUOTA_DAYS,
            free_reset_days: MAX_QUOTA_DAYS,
            ..QuotaPolicy::default()
        };
        assert!(ConfigBuilder::new().with_quota(quota).build().is_ok());
    }

    #[test]
    fn test_from_env_reads_billing_settings() {
        unsafe {
            std::env::set_var("LESSONFORGE_STRIPE_PRO_PRICE_ID", "price_from_env");
            std::env::set_var(
                "LESSONFORGE_ALLOWED_REDIRECT_DOMAINS",
                "lessonforge.app, example.com",
            );
            std::env::set_var("LESSONFORGE_FREE_LIMIT", "12");
        }

        let config = ConfigBuilder::new().from_env().build().unwrap();

        unsafe {
            std::env::remove_var("LESSONFORGE_STRIPE_PRO_PRICE_ID");
            std::env::remove_var("LESSONFORGE_ALLOWED_REDIRECT_DOMAINS");
            std::env::remove_var("LESSONFORGE_FREE_LIMIT");
        }

        assert_eq!(config.billing.pro_price_id, "price_from_env");
        assert_eq!(
            config.billing.allowed_redirect_domains,
            vec!["lessonforge.app", "example.com"]
        );
        assert_eq!(config.billing.quota.free_limit, 12);
        assert_eq!(config.billing.quota.subscribed_limit, 30);
    }

    #[test]
    fn test_auth_settings() {
        let config = ConfigBuilder::new().build().unwrap();
        assert!(!config.auth.is_configured());

        let config = ConfigBuilder::new()
            .with_jwt_secret("session-secret")
            .build()
            .unwrap();
        assert!(config.auth.is_configured());

        assert!(ConfigBuilder::new().with_jwks_url("not a url").build().is_err());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: Config =
            serde_json::from_str(r#"{"billing": {"pro_price_id": "price_x"}}"#).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.billing.pro_price_id, "price_x");
        assert_eq!(config.billing.quota, QuotaPolicy::default());
        assert!(config.billing.stripe_secret_key.is_none());
    }
}
