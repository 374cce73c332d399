//! Google OAuth2 authorization-code flow.

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

use super::types::FederatedIdentity;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const LOGIN_SCOPES: &str = "openid email profile";

/// Cookie holding the `state` value of a login in progress.
pub const STATE_COOKIE: &str = "oauth_state";
const STATE_COOKIE_PATH: &str = "/api/auth/google";
const STATE_COOKIE_MAX_AGE_SECS: i64 = 10 * 60;

/// Google client credentials.
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

/// Profile returned by the userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl From<GoogleUserInfo> for FederatedIdentity {
    fn from(info: GoogleUserInfo) -> Self {
        FederatedIdentity {
            email: info.email,
            name: info.name.unwrap_or_default(),
            provider_id: info.id,
            profile_image_url: info.picture,
        }
    }
}

pub struct GoogleOAuthClient {
    config: GoogleOAuthConfig,
    http: reqwest::Client,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleOAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// URL the browser is sent to in order to start the login.
    pub fn authorization_url(&self, csrf_state: &str) -> String {
        format!(
            "{}?\
             client_id={}&\
             redirect_uri={}&\
             response_type=code&\
             scope={}&\
             state={}",
            AUTHORIZE_URL,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(LOGIN_SCOPES),
            urlencoding::encode(csrf_state)
        )
    }

    /// `Set-Cookie` value binding `csrf_state` to the browser that starts the login.
    pub fn state_cookie(&self, csrf_state: &str) -> String {
        let secure = if self.config.redirect_uri.starts_with("https://") {
            "; Secure"
        } else {
            ""
        };
        format!(
            "{}={}; Path={}; HttpOnly; SameSite=Lax; Max-Age={}{}",
            STATE_COOKIE, csrf_state, STATE_COOKIE_PATH, STATE_COOKIE_MAX_AGE_SECS, secure
        )
    }

    /// `Set-Cookie` value that removes the state cookie.
    pub fn clear_state_cookie(&self) -> String {
        format!(
            "{}=; Path={}; HttpOnly; SameSite=Lax; Max-Age=0",
            STATE_COOKIE, STATE_COOKIE_PATH
        )
    }

    /// Exchange an authorization code and fetch the signed-in user's profile.
    pub async fn fetch_identity(&self, code: &str) -> anyhow::Result<GoogleUserInfo> {
        #[derive(Serialize)]
        struct TokenRequest<'a> {
            code: &'a str,
            client_id: &'a str,
            client_secret: &'a str,
            redirect_uri: &'a str,
            grant_type: &'a str,
        }

        let token_response = self
            .http
            .post(TOKEN_URL)
            .form(&TokenRequest {
                code,
                client_id: &self.config.client_id,
                client_secret: &self.config.client_secret,
                redirect_uri: &self.config.redirect_uri,
                grant_type: "authorization_code",
            })
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Token exchange failed: {}", e))?;

        if !token_response.status().is_success() {
            let status = token_response.status();
            let body = token_response.text().await.unwrap_or_default();
            tracing::error!("Token exchange failed: {} - {}", status, body);
            anyhow::bail!("Token exchange rejected with status {}", status);
        }

        let tokens: GoogleTokenResponse = token_response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Invalid token response: {}", e))?;

        let user_info: GoogleUserInfo = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get user info: {}", e))?
            .error_for_status()
            .map_err(|e| anyhow::anyhow!("User info request rejected: {}", e))?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Invalid user info response: {}", e))?;

        Ok(user_info)
    }
}

fn state_from_cookies(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;

    for cookie_str in cookie_header.split(';') {
        if let Ok(cookie) = cookie::Cookie::parse(cookie_str.trim()) {
            if cookie.name() == STATE_COOKIE {
                return Some(cookie.value().to_string());
            }
        }
    }

    None
}

/// True when the callback's `state` equals the one stored in the browser's
/// cookie at login start. A missing or empty value on either side fails.
pub fn state_matches(headers: &HeaderMap, returned: Option<&str>) -> bool {
    match (state_from_cookies(headers), returned) {
        (Some(expected), Some(returned)) => !expected.is_empty() && expected == returned,
        _ => false,
    }
}
