use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::auth::Role;

// --- Core Content Schemas ---

/// Post
///
/// A stored content entity. `id` and `slug` are assigned by the store and are
/// unique among live posts; callers always receive an owned copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Post {
    // Monotonically increasing, never reused.
    pub id: u64,
    pub title: String,
    pub body: String,
    pub summary: String,
    // Name of the principal that created the post.
    pub author: String,
    // Derived from `title`; unique among live posts.
    pub slug: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// NewPost
///
/// Input payload for creating a post (POST /posts). Any slug the client sends
/// is ignored; the store always derives its own.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub summary: String,
    // Filled from the authenticated identity, never from the request body.
    #[serde(skip)]
    pub author: String,
}

impl NewPost {
    /// Rejects drafts missing a title or body.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if self.body.trim().is_empty() {
            return Err(ValidationError::MissingField("body"));
        }
        Ok(())
    }
}

/// PostPatch
///
/// Partial update payload (PUT /posts/{slug}). Absent fields are left as-is.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PostPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl PostPatch {
    /// A patch may omit fields but may not blank out required ones.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ValidationError::MissingField("title"));
        }
        if self.body.as_deref().is_some_and(|b| b.trim().is_empty()) {
            return Err(ValidationError::MissingField("body"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
}

// --- Subscriber Schemas ---

/// Subscriber
///
/// A newsletter address. `confirmation_token` is only set until the address is
/// confirmed and is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Subscriber {
    pub id: u64,
    // Trimmed and lowercased; unique across the list.
    pub email: String,
    pub confirmed: bool,
    #[serde(skip)]
    pub confirmation_token: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// SubscriptionRequest
///
/// Input payload for POST /subscribe and POST /unsubscribe, as JSON or as an
/// urlencoded form.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SubscriptionRequest {
    #[serde(default)]
    pub email: String,
}

/// ConfirmQuery
///
/// Query string of GET /confirm.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConfirmQuery {
    pub token: Option<String>,
}

/// MessageBody
///
/// Plain acknowledgement returned by the subscription routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// --- Identity Schemas ---

/// User
///
/// A credential-store record. `password_hash` is a bcrypt hash and is never
/// serialized.
#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// LoginRequest
///
/// Input payload for POST /login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// LoginResponse
///
/// The issued token, echoed in the body for API clients. Browser clients use
/// the `jwt` cookie set on the same response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: Role,
}

/// Profile
///
/// Output schema for GET /me.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Profile {
    pub username: String,
    pub role: Role,
}

/// ErrorBody
///
/// Machine-readable error payload used by every JSON error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
