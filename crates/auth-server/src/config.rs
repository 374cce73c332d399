//! Server configuration from flags and environment variables.

use axum::http::HeaderValue;
use chrono::Duration;
use clap::Parser;
use thiserror::Error;

use crate::auth::{GoogleOAuthConfig, PasswordHasher, TokenCodec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set")]
    MissingSecret,

    #[error("JWT_SECRET must be at least {min} bytes, got {actual}")]
    WeakSecret { min: usize, actual: usize },

    #[error("GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_REDIRECT_URI must be set together")]
    PartialGoogleConfig,

    #[error("{0}")]
    Invalid(String),
}

#[derive(Parser, Clone)]
#[command(name = "auth-server")]
#[command(about = "Token-based authentication server with local and Google login")]
pub struct Config {
    /// Secret key used to sign and verify bearer tokens.
    /// Must be at least 32 bytes. There is no default.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Lifetime of issued tokens, in hours.
    #[arg(long, env = "TOKEN_TTL_HOURS", default_value_t = 24)]
    pub token_ttl_hours: i64,

    /// bcrypt cost factor for new password digests (4-31).
    #[arg(long, env = "BCRYPT_COST", default_value_t = 12)]
    pub bcrypt_cost: u32,

    /// PostgreSQL connection URL. Without it accounts are kept in memory
    /// and lost on restart.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Connect to PostgreSQL over TLS.
    #[arg(long, env = "DATABASE_TLS", default_value_t = true, action = clap::ArgAction::Set)]
    pub database_tls: bool,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Google OAuth client ID. Google login is disabled unless all three
    /// Google settings are present.
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    /// Google OAuth client secret.
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: Option<String>,

    /// Redirect URI registered with Google, pointing at /api/auth/google/callback.
    #[arg(long, env = "GOOGLE_REDIRECT_URI")]
    pub google_redirect_uri: Option<String>,

    /// Comma-separated browser origins allowed to call the API.
    /// Any origin is allowed when unset.
    #[arg(long, env = "CORS_ALLOWED_ORIGINS")]
    pub cors_allowed_origins: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("database_tls", &self.database_tls)
            .field("port", &self.port)
            .field("google_client_id", &self.google_client_id)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn token_codec(&self) -> Result<TokenCodec, ConfigError> {
        let ttl = Duration::try_hours(self.token_ttl_hours).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "TOKEN_TTL_HOURS out of range: {}",
                self.token_ttl_hours
            ))
        })?;
        TokenCodec::new(self.jwt_secret.as_bytes(), ttl)
    }

    pub fn password_hasher(&self) -> Result<PasswordHasher, ConfigError> {
        PasswordHasher::new(self.bcrypt_cost)
    }

    /// Google settings, or `None` when Google login is not configured.
    pub fn google(&self) -> Result<Option<GoogleOAuthConfig>, ConfigError> {
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());

        match (
            non_empty(&self.google_client_id),
            non_empty(&self.google_client_secret),
            non_empty(&self.google_redirect_uri),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => {
                Ok(Some(GoogleOAuthConfig {
                    client_id,
                    client_secret,
                    redirect_uri,
                }))
            }
            (None, None, None) => Ok(None),
            _ => Err(ConfigError::PartialGoogleConfig),
        }
    }

    /// Origins from `CORS_ALLOWED_ORIGINS`. Entries that are not valid
    /// header values are skipped; an empty list means no allowlist.
    pub fn cors_origins(&self) -> Vec<HeaderValue> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .filter_map(|origin| origin.parse().ok())
            .collect()
    }
}
