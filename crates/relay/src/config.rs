// Relay server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development.

use std::{net::SocketAddr, time::Duration};

const DEV_JWT_SECRET: &str = "liveservice_local_development_jwt_secret_32_chars";

/// Core relay server configuration.
///
/// Constructed via [`RelayConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Shared secret for HS256 access tokens.
    pub jwt_secret: String,
    /// RS256 public key (PEM). Takes precedence over `jwt_secret` when set.
    pub jwt_public_key_pem: Option<String>,
    /// Expected `iss` claim, validated only when set.
    pub jwt_issuer: Option<String>,
    /// Claim carrying the user identity.
    pub user_id_claim: String,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `liveservice_relay=debug`).
    pub log_filter: String,
    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,
    /// Time a delivered event may stay unacknowledged before it is resent.
    pub ack_timeout: Duration,
    /// Period of the redelivery sweep.
    pub redelivery_interval: Duration,
    /// Sends per event (first delivery included) before it is dropped.
    pub max_delivery_attempts: u32,
}

impl RelayConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `LIVE_RELAY_HOST` | `0.0.0.0` |
    /// | `LIVE_RELAY_PORT` | `8080` |
    /// | `LIVE_RELAY_JWT_SECRET` | dev-only placeholder |
    /// | `LIVE_RELAY_JWT_PUBLIC_KEY` | *(none)* |
    /// | `LIVE_RELAY_JWT_ISSUER` | *(none)* |
    /// | `LIVE_RELAY_USER_ID_CLAIM` | `userId` |
    /// | `LIVE_RELAY_CORS_ORIGINS` | *(none, cors.rs uses dev defaults)* |
    /// | `LIVE_RELAY_LOG_FILTER` | `info` |
    /// | `LIVE_RELAY_LOG_FORMAT` | `text` (`json` for structured output) |
    /// | `LIVE_RELAY_ACK_TIMEOUT_SECS` | `30` |
    /// | `LIVE_RELAY_REDELIVERY_INTERVAL_SECS` | `5` |
    /// | `LIVE_RELAY_MAX_DELIVERY_ATTEMPTS` | `3` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("LIVE_RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 =
            env("LIVE_RELAY_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let jwt_secret = env("LIVE_RELAY_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.into());
        let jwt_public_key_pem =
            env("LIVE_RELAY_JWT_PUBLIC_KEY").ok().filter(|pem| !pem.trim().is_empty());
        let jwt_issuer = env("LIVE_RELAY_JWT_ISSUER").ok().filter(|iss| !iss.trim().is_empty());
        let user_id_claim = env("LIVE_RELAY_USER_ID_CLAIM").unwrap_or_else(|_| "userId".into());

        let cors_origins = env("LIVE_RELAY_CORS_ORIGINS").ok();
        let log_filter = env("LIVE_RELAY_LOG_FILTER").unwrap_or_else(|_| "info".into());
        let log_json =
            env("LIVE_RELAY_LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

        let seconds = |key: &str, default: u64| {
            Duration::from_secs(
                env(key).ok().and_then(|v| v.parse().ok()).filter(|v| *v > 0).unwrap_or(default),
            )
        };
        let ack_timeout = seconds("LIVE_RELAY_ACK_TIMEOUT_SECS", 30);
        let redelivery_interval = seconds("LIVE_RELAY_REDELIVERY_INTERVAL_SECS", 5);
        let max_delivery_attempts = env("LIVE_RELAY_MAX_DELIVERY_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(3);

        Self {
            listen_addr,
            jwt_secret,
            jwt_public_key_pem,
            jwt_issuer,
            user_id_claim,
            cors_origins,
            log_filter,
            log_json,
            ack_timeout,
            redelivery_interval,
            max_delivery_attempts,
        }
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_public_key_pem.is_none() && self.jwt_secret == DEV_JWT_SECRET
    }
}
