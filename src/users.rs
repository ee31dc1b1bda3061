use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::Role;
use crate::config::SeedUser;
use crate::models::User;

/// LoginError
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// Unknown user or wrong password; the two are not distinguished.
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("user already exists")]
    UserExists,
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// UserRepository Trait
///
/// Credential lookup. Password hashing is delegated to bcrypt; implementations
/// never store or compare plain-text passwords.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Returns the user when `password` matches the stored hash.
    async fn authenticate(&self, username: &str, password: &str) -> Result<User, LoginError>;

    /// Hashes `password` and stores a new account.
    async fn create(&self, username: &str, password: &str, role: Role) -> Result<User, LoginError>;
}

pub type UserState = Arc<dyn UserRepository>;

/// InMemoryUserRepository
///
/// Accounts keyed by username. Hashing and verification run on the blocking
/// pool so bcrypt's work factor never stalls the async workers.
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
    cost: u32,
}

impl InMemoryUserRepository {
    pub fn new(cost: u32) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            cost,
        }
    }

    /// Builds a store pre-populated with `seeds`.
    pub async fn seeded(cost: u32, seeds: &[SeedUser]) -> Result<Self, LoginError> {
        let repo = Self::new(cost);
        for seed in seeds {
            repo.create(&seed.username, &seed.password, seed.role).await?;
            tracing::info!(username = %seed.username, role = %seed.role, "seeded account");
        }
        Ok(repo)
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn authenticate(&self, username: &str, password: &str) -> Result<User, LoginError> {
        let user = self
            .users
            .read()
            .await
            .get(username)
            .cloned()
            .ok_or(LoginError::InvalidCredentials)?;

        let password = password.to_owned();
        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| LoginError::Hashing(e.to_string()))?
            .map_err(|e| LoginError::Hashing(e.to_string()))?;

        if matches {
            Ok(user)
        } else {
            Err(LoginError::InvalidCredentials)
        }
    }

    async fn create(&self, username: &str, password: &str, role: Role) -> Result<User, LoginError> {
        if self.users.read().await.contains_key(username) {
            return Err(LoginError::UserExists);
        }

        let cost = self.cost;
        let plain = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost))
            .await
            .map_err(|e| LoginError::Hashing(e.to_string()))?
            .map_err(|e| LoginError::Hashing(e.to_string()))?;

        let user = User {
            username: username.to_string(),
            password_hash,
            role,
        };

        // Re-check under the write lock: another caller may have raced us
        // while the hash was computed.
        let mut users = self.users.write().await;
        if users.contains_key(username) {
            return Err(LoginError::UserExists);
        }
        users.insert(user.username.clone(), user.clone());
        Ok(user)
    }
}
