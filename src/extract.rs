use axum::{
    Form, Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::{StatusCode, header},
};
use serde::de::DeserializeOwned;

use crate::gate::ResponseFormat;
use crate::handlers::{ApiError, ApiErrorKind};

/// Payload
///
/// A request body read as JSON, or as an urlencoded form when the client sent
/// one. Unlike bare `Json<T>`, a rejected body comes back as an [`ApiError`] in
/// the caller's negotiated format: `{"error": ...}` for API clients and an
/// error page for browsers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Payload<T>(pub T);

impl<T, S> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // Both are read before the body is consumed.
        let format = ResponseFormat::negotiate(req.headers());
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|rejection| {
                    ApiError::new(body_error(rejection.status(), &rejection.body_text()), format)
                })?;
            return Ok(Payload(value));
        }

        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                let kind = match rejection {
                    JsonRejection::MissingJsonContentType(_) => ApiErrorKind::Body {
                        status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        message: "expected `Content-Type: application/json`".to_string(),
                    },
                    other => body_error(other.status(), &other.body_text()),
                };
                ApiError::new(kind, format)
            })?;
        Ok(Payload(value))
    }
}

/// Turns a deserializer complaint into a short client-facing message. A
/// missing field reads like the handlers' own validation errors.
fn body_error(status: StatusCode, detail: &str) -> ApiErrorKind {
    if let Some(field) = detail
        .split("missing field `")
        .nth(1)
        .and_then(|rest| rest.split('`').next())
    {
        return ApiErrorKind::Body {
            status: StatusCode::BAD_REQUEST,
            message: format!("{field} is required"),
        };
    }

    let message = match status {
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "unsupported content type",
        StatusCode::UNPROCESSABLE_ENTITY => "request body has the wrong shape",
        StatusCode::PAYLOAD_TOO_LARGE => "request body is too large",
        _ => "malformed request body",
    };
    ApiErrorKind::Body {
        status,
        message: message.to_string(),
    }
}
