pub mod account;
pub mod auth;
pub mod error;
pub mod hearts;
pub mod mail;
pub mod middleware;
pub mod reviews;
pub mod stores;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use delicious_db::Database;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::require_auth;

/// Full HTTP surface. Write routes sit behind bearer auth.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/account/forgot", post(account::forgot))
        .route(
            "/account/reset/{token}",
            get(account::validate_reset).post(account::reset),
        )
        .route("/", get(stores::list_stores))
        .route("/stores", get(stores::list_stores))
        .route("/stores/{slug}", get(stores::get_store))
        .route("/tags", get(stores::tags))
        .route("/tags/{tag}", get(stores::tag))
        .route("/top", get(stores::top))
        .route("/api/search", get(stores::search))
        .route("/api/stores/near", get(stores::near));

    let protected_routes = Router::new()
        .route("/account", get(account::account).post(account::update_account))
        .route("/add", post(stores::create_store))
        .route("/add/{id}", post(stores::update_store))
        .route("/api/stores/{id}/heart", post(hearts::toggle_heart))
        .route("/hearts", get(hearts::hearted_stores))
        .route("/reviews/{id}", post(reviews::add_review))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Run a database call off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> delicious_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
