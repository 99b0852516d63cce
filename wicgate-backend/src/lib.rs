pub mod config;
mod error;
pub mod helpers;
mod routes;
mod validation;

pub use error::ErrorResponse;
pub use validation::ValidationError;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use wicgate_live::LiveStore;
use wicgate_live::display::NameCache;

pub struct AppState {
    pub live: LiveStore,
    pub names: NameCache,
    /// SHA-256 of the admin bearer token; admin routes are off without one.
    pub admin_token_hash: Option<String>,
}

impl AppState {
    pub fn new(live: LiveStore, admin_token: Option<&str>) -> Self {
        Self {
            live,
            names: NameCache::default(),
            admin_token_hash: admin_token.map(helpers::hash_token),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per second for public read endpoints
    pub public_per_sec: u64,
    /// Burst size for public read endpoints
    pub public_burst: u32,
    /// Requests per minute for admin endpoints
    pub admin_per_min: u64,
    /// Burst size for admin endpoints
    pub admin_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            public_per_sec: 10,
            public_burst: 20,
            admin_per_min: 30,
            admin_burst: 5,
        }
    }
}

/// Create the application router around an already constructed live store
pub fn create_app(
    state: AppState,
    request_body_limit: usize,
    request_timeout: Duration,
    rate_limit: RateLimitConfig,
) -> Router {
    let admin_enabled = state.admin_token_hash.is_some();
    let state = Arc::new(state);

    // Lenient rate limit for the read endpoints the site polls
    let public_governor = GovernorConfigBuilder::default()
        .per_second(rate_limit.public_per_sec)
        .burst_size(rate_limit.public_burst)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("public rate limit must be non-zero");

    // Strict rate limit for admin controls
    let admin_governor = GovernorConfigBuilder::default()
        .period(Duration::from_millis(60_000 / rate_limit.admin_per_min.max(1)))
        .burst_size(rate_limit.admin_burst)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("admin rate limit must be non-zero");

    let public_routes = Router::new()
        .route("/api/online", get(routes::online))
        .route("/api/status", get(routes::status))
        .route("/api/servers", get(routes::servers))
        .layer(GovernorLayer::new(public_governor));

    let mut app = Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .merge(public_routes);

    if admin_enabled {
        let admin_routes = Router::new()
            .route("/api/admin/refresh", post(routes::refresh))
            .route("/api/admin/visibility", post(routes::visibility))
            .route("/api/admin/online", post(routes::connectivity))
            .layer(GovernorLayer::new(admin_governor));
        app = app.merge(admin_routes);
    } else {
        tracing::info!("ADMIN_TOKEN not set, admin routes disabled");
    }

    app.layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        request_timeout,
    ))
    .layer(RequestBodyLimitLayer::new(request_body_limit))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
