//! Newsletter subscriptions: the subscriber list and the confirmation mail.
//!
//! An address is stored unconfirmed together with a random token. The token is
//! mailed out as a link to `GET /confirm`; following it marks the address
//! confirmed and discards the token.

use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use validator::ValidateEmail;

use crate::models::Subscriber;
use crate::repository::{read_or_cancel, write_or_cancel};

/// Random bytes behind each confirmation token (hex encoded, so 64 characters).
pub const CONFIRMATION_TOKEN_BYTES: usize = 32;

/// SubscriberError
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriberError {
    #[error("email is required")]
    MissingEmail,
    #[error("invalid email format")]
    InvalidEmail,
    #[error("you are already subscribed")]
    AlreadySubscribed,
    #[error("subscriber not found")]
    NotFound,
    #[error("missing confirmation token")]
    MissingToken,
    #[error("invalid or already used confirmation token")]
    UnknownToken,
    #[error("operation cancelled")]
    Cancelled,
}

/// normalize_email
///
/// Trims and lowercases `raw`, then requires a syntactically valid address
/// whose domain ends in an alphabetic label of at least two characters.
pub fn normalize_email(raw: &str) -> Result<String, SubscriberError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(SubscriberError::MissingEmail);
    }

    let has_tld = email
        .rsplit_once('@')
        .and_then(|(_, domain)| domain.rsplit_once('.'))
        .is_some_and(|(_, tld)| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));
    if !has_tld || !email.validate_email() {
        return Err(SubscriberError::InvalidEmail);
    }
    Ok(email)
}

/// A fresh hex-encoded confirmation token.
pub fn confirmation_token() -> String {
    let mut bytes = [0u8; CONFIRMATION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SubscriberRepository Trait
///
/// Storage contract for the subscriber list. Emails arrive already normalized.
/// Like the post store, every call honours its cancellation token up to the
/// point it takes the lock.
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// Stores an unconfirmed subscriber. Fails with `AlreadySubscribed` when
    /// the address is already on the list, confirmed or not.
    async fn create(
        &self,
        email: String,
        token: String,
        cancel: &CancellationToken,
    ) -> Result<Subscriber, SubscriberError>;

    /// Marks the holder of `token` confirmed. A token works once.
    async fn confirm(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<Subscriber, SubscriberError>;

    async fn remove(&self, email: &str, cancel: &CancellationToken) -> Result<(), SubscriberError>;

    /// Every subscriber in id order.
    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<Subscriber>, SubscriberError>;
}

/// SubscriberState
///
/// The concrete type used to share the subscriber list across the application state.
pub type SubscriberState = Arc<dyn SubscriberRepository>;

#[derive(Debug)]
struct Roster {
    subscribers: BTreeMap<u64, Subscriber>,
    emails: HashMap<String, u64>,
    next_id: u64,
}

/// InMemorySubscriberRepository
///
/// One reader/writer lock over the list and its email index, mirroring the
/// post store.
#[derive(Debug)]
pub struct InMemorySubscriberRepository {
    inner: RwLock<Roster>,
}

impl Default for InMemorySubscriberRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySubscriberRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Roster {
                subscribers: BTreeMap::new(),
                emails: HashMap::new(),
                next_id: 1,
            }),
        }
    }
}

#[async_trait]
impl SubscriberRepository for InMemorySubscriberRepository {
    async fn create(
        &self,
        email: String,
        token: String,
        cancel: &CancellationToken,
    ) -> Result<Subscriber, SubscriberError> {
        let mut roster = write_or_cancel(&self.inner, cancel)
            .await
            .ok_or(SubscriberError::Cancelled)?;

        // Checked under the write lock so two racing sign-ups cannot both pass.
        if roster.emails.contains_key(&email) {
            return Err(SubscriberError::AlreadySubscribed);
        }

        let id = roster.next_id;
        roster.next_id += 1;
        let subscriber = Subscriber {
            id,
            email,
            confirmed: false,
            confirmation_token: Some(token),
            created_at: Utc::now(),
        };
        roster.emails.insert(subscriber.email.clone(), id);
        roster.subscribers.insert(id, subscriber.clone());
        tracing::debug!(id, "subscriber added");
        Ok(subscriber)
    }

    async fn confirm(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<Subscriber, SubscriberError> {
        if token.is_empty() {
            return Err(SubscriberError::MissingToken);
        }
        let mut roster = write_or_cancel(&self.inner, cancel)
            .await
            .ok_or(SubscriberError::Cancelled)?;

        let subscriber = roster
            .subscribers
            .values_mut()
            .find(|s| s.confirmation_token.as_deref() == Some(token))
            .ok_or(SubscriberError::UnknownToken)?;
        subscriber.confirmed = true;
        subscriber.confirmation_token = None;
        tracing::debug!(id = subscriber.id, "subscriber confirmed");
        Ok(subscriber.clone())
    }

    async fn remove(&self, email: &str, cancel: &CancellationToken) -> Result<(), SubscriberError> {
        let mut roster = write_or_cancel(&self.inner, cancel)
            .await
            .ok_or(SubscriberError::Cancelled)?;
        let id = roster.emails.remove(email).ok_or(SubscriberError::NotFound)?;
        roster.subscribers.remove(&id);
        tracing::debug!(id, "subscriber removed");
        Ok(())
    }

    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<Subscriber>, SubscriberError> {
        let roster = read_or_cancel(&self.inner, cancel)
            .await
            .ok_or(SubscriberError::Cancelled)?;
        Ok(roster.subscribers.values().cloned().collect())
    }
}

// --- Confirmation Mail ---

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// ConfirmationMailer Trait
///
/// Sends the "please confirm" message for a new subscription. A failed send
/// never undoes the subscription; the caller logs it and moves on.
#[async_trait]
pub trait ConfirmationMailer: Send + Sync {
    async fn send_confirmation(&self, email: &str, token: &str) -> Result<(), MailError>;
}

/// MailerState
pub type MailerState = Arc<dyn ConfirmationMailer>;

/// LogMailer
///
/// Stand-in mailer with no SMTP transport behind it: the confirmation link is
/// written to the log at debug level instead of being delivered.
#[derive(Debug, Clone)]
pub struct LogMailer {
    public_url: String,
}

impl LogMailer {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into(),
        }
    }

    pub fn confirmation_link(&self, token: &str) -> String {
        format!("{}/confirm?token={token}", self.public_url)
    }
}

#[async_trait]
impl ConfirmationMailer for LogMailer {
    async fn send_confirmation(&self, email: &str, token: &str) -> Result<(), MailError> {
        tracing::debug!(
            to = %email,
            link = %self.confirmation_link(token),
            "confirmation mail not delivered: no mail transport configured"
        );
        Ok(())
    }
}
