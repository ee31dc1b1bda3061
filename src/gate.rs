//! Request-scoped authentication and role gating.
//!
//! `resolve_identity` runs on every route except `/login` and `/logout`: it
//! looks for a token, verifies it, and attaches an [`Identity`] to the request
//! extensions. Anonymous requests pass through untouched. The two session
//! routes stay outside it so a stale cookie never locks a browser out. Routes that need a role add [`require_editor`] (or
//! [`require_role`]) as a route layer on top.

use axum::{
    Json,
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::convert::Infallible;
use std::sync::Arc;

use crate::auth::{Claims, Role, TokenError, TokenService, authorize};
use crate::models::ErrorBody;

/// Name of the cookie that carries the session token for browser clients.
pub const SESSION_COOKIE: &str = "jwt";

const FORBIDDEN_PAGE: &str = "<!DOCTYPE html>\
<html lang=\"en\"><head><meta charset=\"utf-8\"><title>Forbidden</title></head>\
<body><h1>403 - Forbidden</h1><p>You do not have permission to view this page.</p></body></html>";

/// Identity
///
/// The resolved `{principal, role}` pair attached to a request after its token
/// verified. Handlers take `Identity` to require a caller, or
/// `Option<Identity>` to merely observe one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

impl From<&Claims> for Identity {
    fn from(claims: &Claims) -> Self {
        Self {
            username: claims.username.clone(),
            role: claims.role,
        }
    }
}

// --- Credential Extraction ---

/// CredentialSource
///
/// One place a token may travel in. The gate tries its sources in order and
/// stops at the first that yields a token.
pub trait CredentialSource: Send + Sync {
    fn extract(&self, headers: &HeaderMap) -> Option<String>;
}

/// `Authorization: Bearer <token>`.
pub struct BearerHeader;

impl CredentialSource for BearerHeader {
    fn extract(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
    }
}

/// A named cookie holding the same token encoding.
pub struct NamedCookie(pub &'static str);

impl CredentialSource for NamedCookie {
    fn extract(&self, headers: &HeaderMap) -> Option<String> {
        CookieJar::from_headers(headers)
            .get(self.0)
            .map(|cookie| cookie.value().to_owned())
            .filter(|token| !token.is_empty())
    }
}

// --- Content Negotiation ---

/// ResponseFormat
///
/// How a client wants errors delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Html,
}

impl ResponseFormat {
    /// JSON when `Accept` is absent, empty or mentions `application/json`, or
    /// when the request body itself is JSON. HTML otherwise.
    pub fn negotiate(headers: &HeaderMap) -> Self {
        let accept = headers
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .trim();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        if accept.is_empty()
            || accept.contains("application/json")
            || content_type.starts_with("application/json")
        {
            ResponseFormat::Json
        } else {
            ResponseFormat::Html
        }
    }
}

/// Handlers take `ResponseFormat` directly to shape their own error bodies.
impl<S> FromRequestParts<S> for ResponseFormat
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ResponseFormat::negotiate(&parts.headers))
    }
}

// --- Gate ---

/// GateError
///
/// Why the gate refused a request. Authentication failures (401) are kept
/// apart from authorization failures (403).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("authentication required")]
    MissingCredential,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("{required} access required")]
    RoleMismatch { required: Role },
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::MissingCredential | GateError::Token(_) => StatusCode::UNAUTHORIZED,
            GateError::RoleMismatch { .. } => StatusCode::FORBIDDEN,
        }
    }
}

/// GateRejection
///
/// A `GateError` bound to the negotiated format and the login entry point.
#[derive(Debug)]
pub struct GateRejection {
    pub error: GateError,
    pub format: ResponseFormat,
    pub login_path: String,
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let status = self.error.status();
        match self.format {
            ResponseFormat::Json => {
                (status, Json(ErrorBody::new(self.error.to_string()))).into_response()
            }
            ResponseFormat::Html if status == StatusCode::UNAUTHORIZED => {
                // 302, matching what browsers expect from a login bounce.
                (
                    StatusCode::FOUND,
                    [(header::LOCATION, location(&self.login_path))],
                )
                    .into_response()
            }
            ResponseFormat::Html => (status, Html(FORBIDDEN_PAGE)).into_response(),
        }
    }
}

fn location(path: &str) -> HeaderValue {
    HeaderValue::from_str(path).unwrap_or_else(|_| HeaderValue::from_static("/login"))
}

/// AccessGate
///
/// Bridges raw transport (headers, cookies) to a verified [`Identity`].
/// Holds no mutable state; everything it writes goes into the request.
pub struct AccessGate {
    tokens: Arc<TokenService>,
    sources: Vec<Box<dyn CredentialSource>>,
    login_path: String,
}

impl AccessGate {
    /// A gate reading `Authorization: Bearer` first, then the `jwt` cookie.
    pub fn new(tokens: Arc<TokenService>, login_path: impl Into<String>) -> Self {
        Self::with_sources(
            tokens,
            login_path,
            vec![Box::new(BearerHeader), Box::new(NamedCookie(SESSION_COOKIE))],
        )
    }

    pub fn with_sources(
        tokens: Arc<TokenService>,
        login_path: impl Into<String>,
        sources: Vec<Box<dyn CredentialSource>>,
    ) -> Self {
        Self {
            tokens,
            sources,
            login_path: login_path.into(),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// First token found across the configured sources, in order.
    pub fn extract(&self, headers: &HeaderMap) -> Option<String> {
        self.sources.iter().find_map(|source| source.extract(headers))
    }

    /// resolve
    ///
    /// `Ok(None)` for anonymous requests, `Ok(Some(_))` for a verified token,
    /// `Err(_)` when a token was presented but failed verification.
    pub fn resolve(&self, headers: &HeaderMap) -> Result<Option<Claims>, GateError> {
        let Some(token) = self.extract(headers) else {
            return Ok(None);
        };
        Ok(Some(self.tokens.verify(&token)?))
    }

    /// check
    ///
    /// The role gate: verified claims must be present and their role must equal
    /// `required`.
    pub fn check(claims: Option<&Claims>, required: Role) -> Result<(), GateError> {
        let claims = claims.ok_or(GateError::MissingCredential)?;
        if authorize(claims, required) {
            Ok(())
        } else {
            Err(GateError::RoleMismatch { required })
        }
    }

    pub fn reject(&self, error: GateError, headers: &HeaderMap) -> GateRejection {
        GateRejection {
            error,
            format: ResponseFormat::negotiate(headers),
            login_path: self.login_path.clone(),
        }
    }
}

/// GateState
///
/// The concrete type used to share the gate across the application state.
pub type GateState = Arc<AccessGate>;

// --- Middleware ---

/// resolve_identity
///
/// Global middleware. A verified token leaves both its [`Claims`] and the
/// derived [`Identity`] in the request extensions. Anonymous requests continue
/// without either; a
/// presented token that fails verification ends the request with 401 (JSON)
/// or a login redirect (HTML).
pub async fn resolve_identity(
    State(gate): State<GateState>,
    mut request: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    match gate.resolve(request.headers()) {
        Ok(Some(claims)) => {
            tracing::debug!(username = %claims.username, role = %claims.role, "identity attached");
            request.extensions_mut().insert(Identity::from(&claims));
            request.extensions_mut().insert(claims);
        }
        Ok(None) => {}
        Err(error) => {
            tracing::debug!(reason = %error, "credential rejected");
            return Err(gate.reject(error, request.headers()));
        }
    }
    Ok(next.run(request).await)
}

/// require_role
///
/// Lets the request through only when the attached identity holds `required`.
pub async fn require_role(
    gate: &AccessGate,
    required: Role,
    request: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    if let Err(error) = AccessGate::check(request.extensions().get::<Claims>(), required) {
        tracing::debug!(reason = %error, uri = %request.uri(), "role gate refused request");
        return Err(gate.reject(error, request.headers()));
    }
    Ok(next.run(request).await)
}

/// require_editor
///
/// Route layer for every editor-only route.
pub async fn require_editor(
    State(gate): State<GateState>,
    request: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    require_role(&gate, Role::Editor, request, next).await
}

// --- Extractors ---

/// Required identity. Rejects with the gate's negotiated 401 when absent.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    GateState: FromRef<S>,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Identity>() {
            Some(identity) => Ok(identity.clone()),
            None => {
                let gate = GateState::from_ref(state);
                Err(gate.reject(GateError::MissingCredential, &parts.headers))
            }
        }
    }
}

/// Optional identity, for routes that only adjust output for signed-in callers.
impl<S> OptionalFromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().cloned())
    }
}
