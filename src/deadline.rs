use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::AppConfig;

/// Deadline
///
/// The request's cancellation token. Every store call made on behalf of a
/// request is handed this token; once it fires, calls that have not yet taken
/// the store lock return `StoreError::Cancelled`.
#[derive(Debug, Clone)]
pub struct Deadline(pub CancellationToken);

/// attach_deadline
///
/// Arms a timer for `request_timeout_secs` and cancels the token when it
/// elapses. The token is also cancelled once the response is produced, which
/// stops the timer.
pub async fn attach_deadline(
    State(config): State<AppConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = CancellationToken::new();
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "request deadline elapsed");
                timer.cancel();
            }
        }
    });

    request.extensions_mut().insert(Deadline(token.clone()));
    let _guard = token.drop_guard();
    next.run(request).await
}

/// Falls back to a token that never fires when no deadline middleware ran.
impl<S> FromRequestParts<S> for Deadline
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Deadline>()
            .cloned()
            .unwrap_or_else(|| Deadline(CancellationToken::new())))
    }
}
