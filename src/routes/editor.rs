use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Editor Router Module
///
/// Content mutation and the subscriber list. `create_router` applies
/// `gate::require_editor` as a route layer, so a reader gets 403 and an
/// anonymous caller 401 (or the HTML equivalents) before any handler runs.
pub fn editor_routes() -> Router<AppState> {
    Router::new()
        // POST /posts
        .route("/posts", post(handlers::create_post))
        // PUT/DELETE /posts/{slug}
        // A title change in the update may move the post to a new slug.
        .route(
            "/posts/{slug}",
            put(handlers::update_post).delete(handlers::delete_post),
        )
        // GET /subscribers
        // The newsletter list, tokens stripped.
        .route("/subscribers", get(handlers::list_subscribers))
}
