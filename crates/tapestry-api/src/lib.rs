pub mod auth;
pub mod calendars;
pub mod chores;
pub mod error;
pub mod families;
pub mod goals;
pub mod health;
pub mod middleware;
pub mod points;
pub mod users;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use chrono::Duration;
use tapestry_core::GroupUncomplete;
use tapestry_db::Database;
use tracing::error;

pub use error::ApiError;
use middleware::require_auth;

/// Request-time settings, built once at startup from the server config.
#[derive(Debug, Clone)]
pub struct Settings {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub reset_ttl: Duration,
    pub qr_ttl: Duration,
    /// Prefix of the QR payload; the session token is appended as `?token=`.
    pub qr_url_base: String,
    /// Return reset tokens in the forgot-password response. Only for
    /// development, where there is no mail transport.
    pub expose_reset_tokens: bool,
    pub group_uncomplete: GroupUncomplete,
}

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub settings: Settings,
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("worker task failed"))
        })?
}

/// The full HTTP surface: `/api/...` plus the health probes.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/admin-login", post(auth::admin_login))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/qr", post(auth::create_qr_session))
        .route("/auth/qr/{token}", get(auth::poll_qr_session));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/qr/scan", post(auth::scan_qr_session))
        .route("/users", get(users::list_members).post(users::create_member))
        .route(
            "/users/{id}",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route("/families", get(families::own_family).post(families::create_family))
        .route(
            "/families/{id}",
            get(families::get_family)
                .put(families::update_family)
                .delete(families::delete_family),
        )
        .route("/families/{id}/invite", post(families::invite))
        .route("/calendars", get(calendars::list_events).post(calendars::create_event))
        .route(
            "/calendars/{id}",
            put(calendars::update_event).delete(calendars::delete_event),
        )
        .route("/chores", get(chores::list_chores).post(chores::create_chore))
        .route("/chores/{id}", put(chores::update_chore).delete(chores::delete_chore))
        .route("/chores/{id}/complete", post(chores::toggle_completion))
        .route("/chores/{id}/completions", get(chores::completions))
        .route("/points", get(points::list_points).post(points::award_points))
        .route("/points/leaderboard", get(points::leaderboard))
        .route("/goals", get(goals::list_goals).post(goals::create_goal))
        .route("/goals/{id}", put(goals::update_goal).delete(goals::delete_goal))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    let health_routes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz));

    Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .merge(health_routes)
        .with_state(state)
}
