use anyhow::{Context, Result};
use std::time::Duration;

use crate::crypto::SecretString;

/// Default session lifetime: 30 days.
const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 24 * 3600;

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,
    pub base_url: String,
    /// Where browsers land after a successful sign-in.
    pub post_login_url: String,
    /// Sign-in page that failed browser flows are sent back to.
    pub sign_in_page: String,

    // ── Sessions ────────────────────────────────────────────────────────
    /// HS256 key for session tokens.
    pub session_secret: SecretString,
    pub session_ttl: Duration,

    // ── Crypto ──────────────────────────────────────────────────────────
    /// 32-byte base64-encoded key for AES-256-GCM encryption of provider tokens.
    pub master_key: SecretString,
    /// Base64-encoded HMAC key for OAuth state signing.
    pub hmac_secret: SecretString,

    // ── Service-to-service auth ─────────────────────────────────────────
    /// Shared secret for internal callers reading provider tokens.
    /// Token reads are refused when unset.
    pub auth_service_secret: Option<SecretString>,

    // ── Account API ─────────────────────────────────────────────────────
    /// Base URL of the account service notified on every sign-in.
    pub account_api_url: String,

    // ── Provider Credentials ────────────────────────────────────────────
    pub discord_client_id: Option<String>,
    pub discord_client_secret: Option<SecretString>,
    pub telegram_bot_token: Option<SecretString>,
    /// Optional freshness window for Telegram `auth_date`.
    pub telegram_max_auth_age: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; `from_env` uses the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = var("PORT")
            .unwrap_or_else(|| "8430".into())
            .parse()
            .context("Invalid PORT")?;
        let base_url = var("BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();

        let session_ttl = match var("SESSION_TTL_SECS") {
            Some(v) => Duration::from_secs(v.parse().context("Invalid SESSION_TTL_SECS")?),
            None => Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        };

        let telegram_max_auth_age = var("TELEGRAM_MAX_AUTH_AGE_SECS")
            .map(|v| v.parse().map(Duration::from_secs))
            .transpose()
            .context("Invalid TELEGRAM_MAX_AUTH_AGE_SECS")?;

        Ok(Config {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            post_login_url: var("POST_LOGIN_URL").unwrap_or_else(|| base_url.clone()),
            sign_in_page: var("SIGN_IN_PAGE").unwrap_or_else(|| "/auth/signin".into()),
            base_url,

            session_secret: var("SESSION_SECRET")
                .context("SESSION_SECRET is required (session token signing key)")?
                .into(),
            session_ttl,

            master_key: var("MASTER_KEY")
                .context("MASTER_KEY is required (32 bytes, base64)")?
                .into(),
            hmac_secret: var("HMAC_SECRET")
                .context("HMAC_SECRET is required (base64, at least 16 bytes)")?
                .into(),
            auth_service_secret: var("AUTH_SERVICE_SECRET").map(SecretString::from),

            account_api_url: var("ACCOUNT_API_URL")
                .context("ACCOUNT_API_URL is required (account service base URL)")?
                .trim_end_matches('/')
                .to_string(),

            discord_client_id: var("DISCORD_CLIENT_ID"),
            discord_client_secret: var("DISCORD_CLIENT_SECRET").map(SecretString::from),
            telegram_bot_token: var("TELEGRAM_BOT_TOKEN").map(SecretString::from),
            telegram_max_auth_age,
        })
    }

    /// Get the callback URL for a specific provider.
    pub fn callback_url(&self, provider: &str) -> String {
        format!("{}/v1/auth/callback/{}", self.base_url, provider)
    }

    /// Sign-in page URL carrying an error code.
    pub fn sign_in_error_url(&self, code: &str) -> String {
        let separator = if self.sign_in_page.contains('?') { '&' } else { '?' };
        format!("{}{separator}error={code}", self.sign_in_page)
    }
}
