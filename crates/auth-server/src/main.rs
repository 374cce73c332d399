use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use clap::Parser;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod config;
mod db;
pub mod error;
mod models;
mod routes;
mod schema;
mod store;

use crate::config::Config;
use crate::routes::{api_routes, AppState};
use crate::store::{MemoryUserStore, UserStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::parse();
    tracing::debug!(?config, "Loaded configuration");

    // Any configuration error stops startup.
    let codec = config.token_codec()?;
    let hasher = config.password_hasher()?;
    let google = config.google()?;

    let store: Arc<dyn UserStore> = match &config.database_url {
        Some(url) => {
            let pool = db::establish_connection_pool(url, config.database_tls)?;
            tracing::info!("Database connection pool initialized");
            Arc::new(db::PgUserStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping accounts in memory (lost on restart)");
            Arc::new(MemoryUserStore::new())
        }
    };

    if google.is_none() {
        tracing::info!("Google login disabled");
    }
    tracing::info!(
        token_ttl_hours = codec.ttl().num_hours(),
        bcrypt_cost = hasher.cost(),
        "Authentication configured"
    );

    let state = AppState::new(store, codec, hasher, google);
    let app = api_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(config.cors_origins()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Cross-origin policy for the JSON API. An empty allowlist accepts any origin.
fn build_cors_layer(origins: Vec<HeaderValue>) -> CorsLayer {
    if origins.is_empty() {
        tracing::warn!("No CORS allowlist configured, accepting any origin");
        return CorsLayer::permissive();
    }

    tracing::info!(?origins, "CORS allowlist configured");
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
