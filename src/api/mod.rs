use axum::{
    Router,
    extract::OriginalUri,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Store;
use crate::services::AccountService;
use crate::state::SharedState;

mod accounts;
pub mod auth;
pub mod client_ip;
mod error;
mod observability;
mod system;
mod types;

pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn account_service(&self) -> &Arc<dyn AccountService> {
        &self.shared.account_service
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().server.cors_allowed_origins.clone();

    let accounts_router = Router::new()
        .merge(create_protected_router(state.clone()))
        .route("/authenticate", post(accounts::authenticate))
        .route("/refresh-token", post(accounts::refresh_token))
        .route("/register", post(accounts::register))
        .route("/verify-email", post(accounts::verify_email))
        .route("/forgot-password", post(accounts::forgot_password))
        .route(
            "/validate-reset-token",
            post(accounts::validate_reset_token),
        )
        .route("/reset-password", post(accounts::reset_password));

    let api_router = Router::new()
        .nest("/accounts", accounts_router)
        .route("/metrics", get(observability::get_metrics))
        .route("/health/live", get(system::health_live))
        .route("/health/ready", get(system::health_ready))
        .route_layer(middleware::from_fn(observability::logging_middleware))
        .fallback(api_not_found)
        .with_state(state);

    // Credentialed CORS (the refresh cookie) cannot be combined with wildcards.
    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static("x-requested-with"),
            ])
            .allow_credentials(true)
    };

    Router::new().nest("/api", api_router).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(
                observability::security_headers_middleware,
            ))
            .layer(cors_layer),
    )
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/revoke-token", post(accounts::revoke_token))
        .route(
            "/",
            get(accounts::list_accounts).post(accounts::create_account),
        )
        .route(
            "/{id}",
            get(accounts::get_account)
                .put(accounts::update_account)
                .delete(accounts::delete_account),
        )
        .route("/{id}/refresh-tokens", get(accounts::list_refresh_tokens))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

async fn api_not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}
