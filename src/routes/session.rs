use crate::{AppState, handlers};
use axum::{Router, routing::post};

/// Session Router Module
///
/// `create_router` merges these after the `resolve_identity` layer, so the
/// presented cookie or header is never verified here. Signing in over an
/// expired session and signing out of one both have to work.
pub fn session_routes() -> Router<AppState> {
    Router::new()
        // POST /login
        // Exchanges credentials for a token (body + `jwt` cookie).
        .route("/login", post(handlers::login))
        // POST /logout
        // Always answers with a removal `Set-Cookie` for `jwt`.
        .route("/logout", post(handlers::logout))
}
