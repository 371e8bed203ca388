pub mod extract;
pub mod health;
pub mod session;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::middleware::auth::{require_candidate, JwtAuth};
use crate::middleware::rate_limit::{rps_middleware, RateLimiter};
use crate::store::SessionStore;
use crate::AppState;

/// Full application router; the session API sits behind bearer auth and the rate limiter.
pub fn app_router<S: SessionStore>(state: AppState<S>, auth: JwtAuth, limiter: RateLimiter) -> Router {
    let session_api = Router::new()
        .route("/api/sessions", post(session::create_session::<S>))
        .route(
            "/api/sessions/:id/instructions",
            get(session::get_instructions::<S>),
        )
        .route("/api/sessions/:id/start", post(session::start_session::<S>))
        .route("/api/sessions/:id/answers", patch(session::save_answer::<S>))
        .route(
            "/api/sessions/:id/violations",
            post(session::report_violation::<S>),
        )
        .route("/api/sessions/:id/submit", post(session::submit_session::<S>))
        .route("/api/sessions/:id/status", get(session::get_status::<S>))
        .route("/api/sessions/:id/resume", get(session::resume_session::<S>))
        .route("/api/sessions/:id/result", get(session::get_result::<S>))
        .layer(axum::middleware::from_fn_with_state(auth, require_candidate))
        .layer(axum::middleware::from_fn_with_state(limiter, rps_middleware));

    Router::new()
        .route("/health", get(health::health))
        .merge(session_api)
        .with_state(state)
}
