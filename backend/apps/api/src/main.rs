//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors; request errors render through
//! the auth crate's `AppError` conversion.

mod config;

use std::sync::Arc;
use std::time::Duration;

use auth::{
    MemoryOutbox, MemoryTokenBlacklistStore, MemoryUserStore, PgTokenBlacklistStore, PgUserStore,
    SessionService, auth_router,
};
use axum::{
    Router, http,
    http::{Method, header},
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often lapsed blacklist entries are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,auth=info,platform=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = config::load_server_config()?;
    let auth_config = config::load_auth_config()?;
    tracing::info!(
        access_ttl_secs = auth_config.access_token.ttl.as_secs(),
        refresh_ttl_secs = auth_config.refresh_token_ttl.as_secs(),
        "Auth configuration loaded"
    );

    // Reset tokens are recorded, not mailed, until a delivery backend exists.
    let outbox = Arc::new(MemoryOutbox::new());

    let auth_routes = match &server.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(auth_config.store_timeout)
                .connect(database_url)
                .await?;

            tracing::info!("Connected to database");

            // Run migrations
            sqlx::migrate!("../../../database/migrations")
                .run(&pool)
                .await?;

            tracing::info!("Migrations completed");

            let blacklist = Arc::new(PgTokenBlacklistStore::new(pool.clone()));

            // Startup cleanup; errors here should not prevent server startup
            if let Err(e) = blacklist.purge_expired().await {
                tracing::warn!(error = %e, "Blacklist cleanup failed, continuing anyway");
            }

            let sweeper = blacklist.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(SWEEP_INTERVAL);
                loop {
                    interval.tick().await;
                    if let Err(e) = sweeper.purge_expired().await {
                        tracing::warn!(error = %e, "Blacklist sweep failed");
                    }
                }
            });

            let service = SessionService::from_config(
                Arc::new(PgUserStore::new(pool)),
                blacklist,
                outbox,
                auth_config,
            )?;
            auth_router(service)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");

            let blacklist = Arc::new(MemoryTokenBlacklistStore::new());

            let sweeper = blacklist.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(SWEEP_INTERVAL);
                loop {
                    interval.tick().await;
                    let purged = sweeper.purge_expired().await;
                    tracing::debug!(tokens_deleted = purged, "Blacklist sweep completed");
                }
            });

            let service = SessionService::from_config(
                Arc::new(MemoryUserStore::new()),
                blacklist,
                outbox,
                auth_config,
            )?;
            auth_router(service)
        }
    };

    // CORS configuration
    let allowed_origins: Vec<http::HeaderValue> = server
        .frontend_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]));

    // Build router (not nested: the route table is keyed by full path)
    let app = Router::new()
        .merge(auth_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    tracing::info!("Listening on {}", server.bind_addr);

    let listener = TcpListener::bind(server.bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
