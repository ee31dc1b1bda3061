use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes for any signed-in caller, whatever the role. `create_router` wraps
/// this router in `auth_middleware`, which rejects anonymous requests.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // The identity resolved from the caller's token.
        .route("/me", get(handlers::get_me))
}
