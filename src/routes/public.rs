use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints any client may call. A presented token is still verified by the
/// global `resolve_identity` layer, so a bad token is rejected even here.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for monitors and load balancers.
        .route("/health", get(handlers::health))
        // GET /posts
        .route("/posts", get(handlers::list_posts))
        // GET /posts/{slug}
        .route("/posts/{slug}", get(handlers::get_post))
        // POST /subscribe
        // JSON or form body; the confirmation link goes out by mail.
        .route("/subscribe", post(handlers::subscribe))
        // GET /confirm?token=...
        .route("/confirm", get(handlers::confirm_subscription))
        // POST /unsubscribe
        .route("/unsubscribe", post(handlers::unsubscribe))
}
