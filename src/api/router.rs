//! API router.
//!
//! Returns a composable `Router` with every route nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! Extension → Rate limiter → Session auth → Audit logger → Handler

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

pub(crate) fn build_router(ctx: ApiContext) -> Router {
    // Layers apply bottom (innermost) to top (outermost). Extension must be
    // outermost so every middleware can read ApiContext.
    // Path params use `:param` syntax (axum 0.7).
    let protected = Router::new()
        .route("/auth/me", get(endpoints::auth::me))
        .route("/auth/logout", post(endpoints::auth::logout))
        .route("/questionnaire/next", post(endpoints::questionnaire::next))
        .route("/questionnaire/options", post(endpoints::questionnaire::options))
        .route(
            "/questionnaire/suggestions",
            post(endpoints::questionnaire::suggestions),
        )
        .route("/emergency/check", post(endpoints::emergency::check))
        .route("/assessment", post(endpoints::assessment::assess))
        .route(
            "/consultations",
            get(endpoints::consultations::list).post(endpoints::consultations::create),
        )
        .route("/consultations/:id", get(endpoints::consultations::detail))
        .route(
            "/consultations/:id/messages",
            post(endpoints::consultations::send_message),
        )
        .route(
            "/consultations/:id/status",
            post(endpoints::consultations::set_status),
        )
        .route(
            "/consultations/:id/translate",
            post(endpoints::consultations::translate),
        )
        .route("/audit/recent", get(endpoints::audit::recent))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx.clone()));

    // Rate-limited only
    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/session", post(endpoints::auth::create_session))
        .route("/auth/refresh", post(endpoints::auth::refresh))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx));

    Router::new()
        .nest("/api", protected)
        .nest("/api", unprotected)
}
