use crate::{
    AppState,
    auth::TokenError,
    config::Env,
    deadline::Deadline,
    extract::Payload,
    gate::{Identity, ResponseFormat, SESSION_COOKIE},
    models::{
        ConfirmQuery, ErrorBody, LoginRequest, LoginResponse, MessageBody, NewPost, Post,
        PostPatch, Profile, Subscriber, SubscriptionRequest, ValidationError,
    },
    repository::StoreError,
    subscribers::{self, SubscriberError},
    users::LoginError,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;

const NOT_FOUND_PAGE: &str = "<!DOCTYPE html>\
<html lang=\"en\"><head><meta charset=\"utf-8\"><title>404 - Page Not Found</title></head>\
<body><h1>404 - Page Not Found</h1></body></html>";

// --- Error Mapping ---

/// ApiErrorKind
///
/// Every failure a handler can surface. Store and token services stay
/// transport-agnostic; the HTTP translation happens here.
#[derive(Debug, thiserror::Error)]
pub enum ApiErrorKind {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Subscriber(#[from] SubscriberError),
    /// The request body could not be read into the expected payload.
    #[error("{message}")]
    Body { status: StatusCode, message: String },
    #[error("page not found")]
    RouteNotFound,
}

/// ApiError
///
/// An `ApiErrorKind` rendered in the caller's negotiated format.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub format: ResponseFormat,
}

impl ApiError {
    pub fn new(kind: impl Into<ApiErrorKind>, format: ResponseFormat) -> Self {
        Self {
            kind: kind.into(),
            format,
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.kind {
            ApiErrorKind::Store(StoreError::NotFound)
            | ApiErrorKind::Subscriber(SubscriberError::NotFound)
            | ApiErrorKind::RouteNotFound => StatusCode::NOT_FOUND,
            ApiErrorKind::Store(StoreError::Cancelled)
            | ApiErrorKind::Subscriber(SubscriberError::Cancelled) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiErrorKind::Subscriber(SubscriberError::AlreadySubscribed) => StatusCode::CONFLICT,
            ApiErrorKind::Subscriber(_) => StatusCode::BAD_REQUEST,
            ApiErrorKind::Body { status, .. } => *status,
            ApiErrorKind::Validation(_) => StatusCode::BAD_REQUEST,
            ApiErrorKind::Login(LoginError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            ApiErrorKind::Login(LoginError::UserExists) => StatusCode::CONFLICT,
            ApiErrorKind::Login(LoginError::Hashing(_)) | ApiErrorKind::Token(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.kind, "request failed");
        }
        match self.format {
            ResponseFormat::Json => (status, Json(ErrorBody::new(self.kind.to_string()))).into_response(),
            ResponseFormat::Html if status == StatusCode::NOT_FOUND => {
                (status, Html(NOT_FOUND_PAGE)).into_response()
            }
            ResponseFormat::Html => (
                status,
                Html(format!(
                    "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>{status}</title></head><body><h1>{status}</h1></body></html>"
                )),
            )
                .into_response(),
        }
    }
}

// --- Handlers ---

/// health
///
/// [Public Route] Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// list_posts
///
/// [Public Route] Every live post, in id order.
#[utoipa::path(
    get,
    path = "/posts",
    responses((status = 200, description = "All posts", body = [Post]))
)]
pub async fn list_posts(
    State(state): State<AppState>,
    viewer: Option<Identity>,
    Deadline(cancel): Deadline,
    format: ResponseFormat,
) -> Result<Json<Vec<Post>>, ApiError> {
    let posts = state
        .repo
        .get_all(&cancel)
        .await
        .map_err(|e| ApiError::new(e, format))?;
    tracing::debug!(
        count = posts.len(),
        viewer = viewer.as_ref().map(|v| v.username.as_str()).unwrap_or("anonymous"),
        "posts listed"
    );
    Ok(Json(posts))
}

/// get_post
///
/// [Public Route] A single post by slug.
#[utoipa::path(
    get,
    path = "/posts/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Deadline(cancel): Deadline,
    format: ResponseFormat,
) -> Result<Json<Post>, ApiError> {
    let post = state
        .repo
        .get_by_slug(&slug, &cancel)
        .await
        .map_err(|e| ApiError::new(e, format))?;
    Ok(Json(post))
}

/// create_post
///
/// [Editor Route] Stores a new post authored by the caller. The slug is
/// always derived by the store.
#[utoipa::path(
    post,
    path = "/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 400, description = "Missing title or body", body = ErrorBody),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Not an editor", body = ErrorBody),
        (status = 415, description = "Body is not JSON", body = ErrorBody),
        (status = 503, description = "Request deadline passed", body = ErrorBody)
    )
)]
pub async fn create_post(
    identity: Identity,
    State(state): State<AppState>,
    Deadline(cancel): Deadline,
    format: ResponseFormat,
    Payload(mut draft): Payload<NewPost>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    draft.validate().map_err(|e| ApiError::new(e, format))?;
    draft.author = identity.username;

    let post = state
        .repo
        .create(draft, &cancel)
        .await
        .map_err(|e| ApiError::new(e, format))?;
    tracing::info!(id = post.id, slug = %post.slug, author = %post.author, "post published");
    Ok((StatusCode::CREATED, Json(post)))
}

/// update_post
///
/// [Editor Route] Applies a partial update. Changing the title may move the
/// post to a new slug; the response carries the current one.
#[utoipa::path(
    put,
    path = "/posts/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    request_body = PostPatch,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn update_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Deadline(cancel): Deadline,
    format: ResponseFormat,
    Payload(patch): Payload<PostPatch>,
) -> Result<Json<Post>, ApiError> {
    patch.validate().map_err(|e| ApiError::new(e, format))?;

    let existing = state
        .repo
        .get_by_slug(&slug, &cancel)
        .await
        .map_err(|e| ApiError::new(e, format))?;
    // The post may be deleted between the lookup and the update; `update`
    // reports that as NotFound.
    let post = state
        .repo
        .update(existing.id, patch, &cancel)
        .await
        .map_err(|e| ApiError::new(e, format))?;
    Ok(Json(post))
}

/// delete_post
///
/// [Editor Route] Removes a post and frees its slug.
#[utoipa::path(
    delete,
    path = "/posts/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn delete_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Deadline(cancel): Deadline,
    format: ResponseFormat,
) -> Result<StatusCode, ApiError> {
    let existing = state
        .repo
        .get_by_slug(&slug, &cancel)
        .await
        .map_err(|e| ApiError::new(e, format))?;
    state
        .repo
        .delete(existing.id, &cancel)
        .await
        .map_err(|e| ApiError::new(e, format))?;
    Ok(StatusCode::NO_CONTENT)
}

/// login
///
/// [Session Route] Exchanges a username/password for a session token. The token
/// is returned in the body and also set as the `jwt` cookie.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Bad credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    format: ResponseFormat,
    Payload(payload): Payload<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let user = state
        .users
        .authenticate(&payload.username, &payload.password)
        .await
        .map_err(|e| {
            tracing::debug!(username = %payload.username, reason = %e, "login refused");
            ApiError::new(e, format)
        })?;

    let token = state
        .gate
        .tokens()
        .issue(&user.username, user.role)
        .map_err(|e| ApiError::new(e, format))?;

    // Session cookie: no Max-Age, so it ends with the browser session.
    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.config.env == Env::Production);

    tracing::info!(username = %user.username, role = %user.role, "signed in");
    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            token,
            username: user.username,
            role: user.role,
        }),
    ))
}

/// logout
///
/// [Session Route] Clears the session cookie. The token itself stays valid
/// until it expires. The removal cookie is sent unconditionally, whatever the
/// request carried, so a browser holding a stale or foreign `jwt` still ends
/// up signed out.
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Cookie cleared"),
        (status = 302, description = "Cookie cleared, redirected to login")
    )
)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar, format: ResponseFormat) -> Response {
    let mut removal = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .build();
    removal.make_removal();
    let jar = jar.add(removal);
    match format {
        ResponseFormat::Html => {
            let location = HeaderValue::from_str(&state.config.login_path)
                .unwrap_or_else(|_| HeaderValue::from_static("/login"));
            (StatusCode::FOUND, jar, [(header::LOCATION, location)]).into_response()
        }
        ResponseFormat::Json => {
            (jar, Json(json!({ "message": "successfully logged out" }))).into_response()
        }
    }
}

/// subscribe
///
/// [Public Route] Adds an address to the newsletter list, unconfirmed, and
/// sends the confirmation mail. Accepts JSON or a form post.
#[utoipa::path(
    post,
    path = "/subscribe",
    request_body = SubscriptionRequest,
    responses(
        (status = 200, description = "Subscribed, confirmation pending", body = MessageBody),
        (status = 400, description = "Missing or invalid email", body = ErrorBody),
        (status = 409, description = "Already subscribed", body = ErrorBody)
    )
)]
pub async fn subscribe(
    State(state): State<AppState>,
    Deadline(cancel): Deadline,
    format: ResponseFormat,
    Payload(request): Payload<SubscriptionRequest>,
) -> Result<Response, ApiError> {
    let email = subscribers::normalize_email(&request.email).map_err(|e| ApiError::new(e, format))?;
    let token = subscribers::confirmation_token();

    let subscriber = state
        .subscribers
        .create(email, token.clone(), &cancel)
        .await
        .map_err(|e| ApiError::new(e, format))?;

    // The address is on the list either way; a failed send is only logged.
    if let Err(e) = state.mailer.send_confirmation(&subscriber.email, &token).await {
        tracing::warn!(id = subscriber.id, error = %e, "confirmation mail failed");
    }
    tracing::info!(id = subscriber.id, "subscription pending confirmation");

    Ok(acknowledge(
        format,
        "Subscription successful. Please check your email to confirm.",
        Some(subscriber.email),
    ))
}

/// confirm_subscription
///
/// [Public Route] Target of the link in the confirmation mail.
#[utoipa::path(
    get,
    path = "/confirm",
    params(("token" = Option<String>, Query, description = "Confirmation token from the mail")),
    responses(
        (status = 200, description = "Confirmed", body = MessageBody),
        (status = 400, description = "Missing, unknown or used token", body = ErrorBody)
    )
)]
pub async fn confirm_subscription(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
    Deadline(cancel): Deadline,
    format: ResponseFormat,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| ApiError::new(SubscriberError::MissingToken, format))?;

    let subscriber = state
        .subscribers
        .confirm(token.trim(), &cancel)
        .await
        .map_err(|e| ApiError::new(e, format))?;
    tracing::info!(id = subscriber.id, "subscription confirmed");

    Ok(acknowledge(format, "Subscription confirmed.", None))
}

/// unsubscribe
///
/// [Public Route] Removes an address from the list, confirmed or not.
#[utoipa::path(
    post,
    path = "/unsubscribe",
    request_body = SubscriptionRequest,
    responses(
        (status = 200, description = "Removed", body = MessageBody),
        (status = 400, description = "Missing or invalid email", body = ErrorBody),
        (status = 404, description = "Not on the list", body = ErrorBody)
    )
)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    Deadline(cancel): Deadline,
    format: ResponseFormat,
    Payload(request): Payload<SubscriptionRequest>,
) -> Result<Response, ApiError> {
    let email = subscribers::normalize_email(&request.email).map_err(|e| ApiError::new(e, format))?;
    state
        .subscribers
        .remove(&email, &cancel)
        .await
        .map_err(|e| ApiError::new(e, format))?;

    Ok(acknowledge(format, "You have been unsubscribed.", None))
}

/// list_subscribers
///
/// [Editor Route] The whole list in id order. Confirmation tokens are never
/// included.
#[utoipa::path(
    get,
    path = "/subscribers",
    responses(
        (status = 200, description = "All subscribers", body = [Subscriber]),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Not an editor", body = ErrorBody)
    )
)]
pub async fn list_subscribers(
    State(state): State<AppState>,
    Deadline(cancel): Deadline,
    format: ResponseFormat,
) -> Result<Json<Vec<Subscriber>>, ApiError> {
    let subscribers = state
        .subscribers
        .get_all(&cancel)
        .await
        .map_err(|e| ApiError::new(e, format))?;
    Ok(Json(subscribers))
}

/// A 200 acknowledgement: `MessageBody` for API clients, a short page for
/// browsers.
fn acknowledge(format: ResponseFormat, message: &str, email: Option<String>) -> Response {
    match format {
        ResponseFormat::Json => Json(MessageBody {
            message: message.to_string(),
            email,
        })
        .into_response(),
        ResponseFormat::Html => Html(format!(
            "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>Newsletter</title></head><body><p>{message}</p></body></html>"
        ))
        .into_response(),
    }
}

/// get_me
///
/// [Authenticated Route] The identity attached to the current request.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Profile", body = Profile),
        (status = 401, description = "Not signed in", body = ErrorBody)
    )
)]
pub async fn get_me(identity: Identity) -> Json<Profile> {
    Json(Profile {
        username: identity.username,
        role: identity.role,
    })
}

/// not_found
///
/// Router fallback for unknown paths.
pub async fn not_found(format: ResponseFormat) -> ApiError {
    ApiError::new(ApiErrorKind::RouteNotFound, format)
}
