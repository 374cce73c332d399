use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::{
    self, AuthenticationProvider, GoogleOAuthClient, GoogleOAuthConfig, IdentityReconciler,
    PasswordHasher, RequestAuthenticator, TokenCodec,
};
use crate::store::UserStore;

/// Shared handler state. Every component is immutable or internally
/// synchronized; nothing request-specific lives here.
#[derive(Clone)]
pub struct AppState {
    pub codec: Arc<TokenCodec>,
    pub provider: Arc<AuthenticationProvider>,
    pub reconciler: Arc<IdentityReconciler>,
    pub authenticator: Arc<RequestAuthenticator>,
    pub google: Option<Arc<GoogleOAuthClient>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn UserStore>,
        codec: TokenCodec,
        hasher: PasswordHasher,
        google: Option<GoogleOAuthConfig>,
    ) -> Self {
        let codec = Arc::new(codec);
        let provider = Arc::new(AuthenticationProvider::new(store.clone(), hasher));
        let reconciler = Arc::new(IdentityReconciler::new(store));
        let authenticator = Arc::new(RequestAuthenticator::new(codec.clone(), provider.clone()));

        Self {
            codec,
            provider,
            reconciler,
            authenticator,
            google: google.map(|config| Arc::new(GoogleOAuthClient::new(config))),
        }
    }
}

/// Routes reachable without a session.
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(auth::handlers::register))
        .route("/auth/login", post(auth::handlers::login))
        .route("/auth/logout", post(auth::handlers::logout))
        .route("/auth/google/login", get(auth::handlers::google_login))
        .route("/auth/google/callback", get(auth::handlers::google_callback))
}

/// Routes behind the authorization gate.
fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(auth::handlers::me))
        .route_layer(middleware::from_fn(auth::require_authenticated))
}

pub fn api_routes(state: AppState) -> Router {
    let authenticator = state.authenticator.clone();

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", public_routes().merge(protected_routes()))
        .layer(middleware::from_fn_with_state(
            authenticator,
            auth::authenticate_request,
        ))
        .with_state(state)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}
