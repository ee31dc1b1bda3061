use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod deadline;
pub mod extract;
pub mod gate;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod slug;
pub mod subscribers;
pub mod users;

// Routing segregation (Public, Session, Authenticated, Editor).
pub mod routes;
use gate::Identity;
use routes::{authenticated, editor, public, session};

// --- Public Re-exports ---

pub use auth::{Role, TokenService};
pub use config::AppConfig;
pub use gate::{AccessGate, GateState};
pub use repository::{InMemoryPostRepository, RepositoryState};
pub use subscribers::{InMemorySubscriberRepository, LogMailer, MailerState, SubscriberState};
pub use users::{InMemoryUserRepository, UserState};

/// ApiDoc
///
/// The OpenAPI document for every route, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::list_posts, handlers::get_post, handlers::create_post,
        handlers::update_post, handlers::delete_post, handlers::login, handlers::logout,
        handlers::get_me, handlers::subscribe, handlers::confirm_subscription,
        handlers::unsubscribe, handlers::list_subscribers
    ),
    components(
        schemas(
            models::Post, models::NewPost, models::PostPatch, models::LoginRequest,
            models::LoginResponse, models::Profile, models::ErrorBody, auth::Role,
            models::Subscriber, models::SubscriptionRequest, models::MessageBody,
        )
    ),
    tags(
        (name = "inkpost", description = "Content API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single container for every shared service. Each piece is explicitly
/// constructed in `main` (or a test) and passed in, so isolated instances can
/// coexist in one process.
#[derive(Clone)]
pub struct AppState {
    /// Content store behind the storage-agnostic post contract.
    pub repo: RepositoryState,
    /// Credential store used by the login route.
    pub users: UserState,
    /// Newsletter list.
    pub subscribers: SubscriberState,
    /// Delivers subscription confirmation links.
    pub mailer: MailerState,
    /// Token verification and role gating.
    pub gate: GateState,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for UserState {
    fn from_ref(app_state: &AppState) -> UserState {
        app_state.users.clone()
    }
}

impl FromRef<AppState> for SubscriberState {
    fn from_ref(app_state: &AppState) -> SubscriberState {
        app_state.subscribers.clone()
    }
}

impl FromRef<AppState> for GateState {
    fn from_ref(app_state: &AppState) -> GateState {
        app_state.gate.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards the authenticated routes. Extracting `Identity` fails with the
/// gate's negotiated 401 when `resolve_identity` attached nothing.
async fn auth_middleware(_identity: Identity, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware,
/// and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let gated_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        // Editor routes share paths with the public ones; only their methods
        // carry the role gate.
        .merge(
            editor::editor_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), gate::require_editor)),
        )
        .fallback(handlers::not_found)
        // Everything above, routed or not, passes token resolution first.
        .layer(middleware::from_fn_with_state(state.clone(), gate::resolve_identity));

    // Session routes join after the identity layer and so never see it.
    let base_router = gated_router
        .merge(session::session_routes())
        .layer(middleware::from_fn_with_state(state.clone(), deadline::attach_deadline))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span so every log line for a request carries its
/// `x-request-id` alongside method and URI.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
