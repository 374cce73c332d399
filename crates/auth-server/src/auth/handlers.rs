//! Authentication HTTP handlers.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use shared_types::{AuthResponse, LoginRequest, OAuthCallbackRequest, RegisterRequest, UserResponse};

use crate::error::{ApiError, ApiResult};
use crate::models::Account;
use crate::routes::AppState;

use super::context::Authenticated;
use super::error::AuthError;
use super::google::{state_matches, GoogleOAuthClient};
use super::types::FederatedIdentity;

fn auth_response(state: &AppState, account: &Account, message: &str) -> ApiResult<AuthResponse> {
    let token = state.codec.issue(&account.email)?;
    Ok(AuthResponse {
        token,
        expires_in: state.codec.ttl().num_seconds(),
        user: UserResponse::from(account),
        message: message.to_string(),
    })
}

/// Register a local account and log it in.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let account = state
        .provider
        .register(&payload.email, &payload.password, &payload.name)
        .await?;

    let response = auth_response(&state, &account, "Registration successful")?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Email/password login.
///
/// The token subject is the authenticated account's email, not the email
/// from the request body.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let principal = match state
        .provider
        .authenticate(&payload.email, &payload.password)
        .await
    {
        Ok(principal) => principal,
        Err(e) => {
            tracing::info!(error = %e, "Login failed");
            return Err(e.into());
        }
    };

    let account = state
        .provider
        .store()
        .find_by_email(&principal.email)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::AccountNotFound)?;

    tracing::info!(account_id = %account.id, "Successful login");
    Ok(Json(auth_response(&state, &account, "Login successful")?))
}

fn google_client(state: &AppState) -> ApiResult<&GoogleOAuthClient> {
    state.google.as_deref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Google login is not configured".to_string())
    })
}

/// Start Google OAuth login flow by redirecting to the consent screen.
///
/// The `state` sent to Google is also stored in a short-lived cookie so the
/// callback can tell that this browser started the login.
pub async fn google_login(State(state): State<AppState>) -> ApiResult<Response> {
    let google = google_client(&state)?;
    let csrf_state = uuid::Uuid::new_v4().to_string();

    Ok((
        [(header::SET_COOKIE, google.state_cookie(&csrf_state))],
        Redirect::to(&google.authorization_url(&csrf_state)),
    )
        .into_response())
}

/// Handle Google OAuth callback.
///
/// Checks the returned `state` against the login cookie, exchanges the
/// authorization code for the user's profile, reconciles it with the local
/// account and returns a session token for that account.
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<OAuthCallbackRequest>,
) -> ApiResult<Response> {
    let google = google_client(&state)?;
    if !state_matches(&headers, params.state.as_deref()) {
        tracing::warn!("OAuth callback with missing or mismatched state");
        return Err(ApiError::bad_request("Invalid OAuth state"));
    }
    if params.code.is_empty() {
        return Err(ApiError::bad_request("Missing authorization code"));
    }

    let user_info = google
        .fetch_identity(&params.code)
        .await
        .map_err(|e| ApiError::BadGateway(e.to_string()))?;

    tracing::info!("OAuth login attempt from: {}", user_info.email);

    let response = complete_federated_login(&state, user_info.into()).await?;
    Ok((
        [(header::SET_COOKIE, google.clear_state_cookie())],
        Json(response),
    )
        .into_response())
}

/// Reconcile a verified third-party identity and issue a token for the
/// resulting account.
pub async fn complete_federated_login(
    state: &AppState,
    identity: FederatedIdentity,
) -> ApiResult<AuthResponse> {
    let account = state.reconciler.reconcile_federated(&identity).await?;

    tracing::info!(account_id = %account.id, "Successful federated login");
    auth_response(state, &account, "Login successful via Google")
}

/// Tokens are stateless, so logging out is the client dropping its token.
pub async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Get the account of the current authenticated user.
pub async fn me(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult<Json<UserResponse>> {
    tracing::debug!(account_id = %principal.account_id, name = %principal.name, "Fetching current user");

    let account = state
        .provider
        .store()
        .find_by_email(&principal.email)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::AccountNotFound)?;

    Ok(Json(UserResponse::from(&account)))
}
