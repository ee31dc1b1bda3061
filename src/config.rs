use crate::auth::{MAX_TOKEN_TTL_HOURS, Role};
use std::env;

/// ConfigError
///
/// Startup configuration failures. Any of these is fatal: the binary refuses to
/// start instead of falling back to an insecure default.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// `JWT_SECRET` is unset or blank. Tokens cannot be signed without it.
    #[error("JWT_SECRET must be set to a non-empty value")]
    MissingSigningSecret,
    /// A variable was present but could not be parsed.
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once in `main`
/// and shared read-only through `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format and cookie hardening.
    pub env: Env,
    // Address the HTTP listener binds to.
    pub bind_addr: String,
    // Symmetric key used to sign and verify session tokens.
    pub jwt_secret: String,
    // Lifetime of an issued token, in hours.
    pub token_ttl_hours: i64,
    // Where HTML clients are sent when they need to authenticate.
    pub login_path: String,
    // Per-request deadline after which store calls are cancelled.
    pub request_timeout_secs: u64,
    // Work factor for password hashes created at seed time.
    pub bcrypt_cost: u32,
    // Accounts created in the credential store at startup.
    pub seed_users: Vec<SeedUser>,
    // Externally reachable base URL, used in subscription confirmation links.
    pub public_url: String,
}

/// SeedUser
///
/// A username/password/role triple provisioned into the in-memory user store.
#[derive(Clone, Debug, PartialEq)]
pub struct SeedUser {
    pub username: String,
    pub password: String,
    pub role: Role,
}

/// Env
///
/// Defines the runtime context.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Provides a safe, non-panicking AppConfig instance primarily used for test setup.
    fn default() -> Self {
        Self {
            env: Env::Local,
            bind_addr: "127.0.0.1:0".to_string(),
            jwt_secret: "super-secure-test-secret-value-local".to_string(),
            token_ttl_hours: 24,
            login_path: "/login".to_string(),
            request_timeout_secs: 5,
            // Minimum cost bcrypt accepts; keeps test seeding fast.
            bcrypt_cost: 4,
            seed_users: Vec::new(),
            public_url: "http://127.0.0.1".to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from environment variables. The signing secret is
    /// mandatory in every environment; demo accounts are only seeded by default
    /// when running locally. Out-of-range numbers and half-configured accounts
    /// are rejected here so nothing downstream has to panic on them.
    pub fn load() -> Result<Self, ConfigError> {
        let runtime = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|secret| !secret.trim().is_empty())
            .ok_or(ConfigError::MissingSigningSecret)?;

        let mut seed_users = Vec::new();
        for (username_var, password_var, role, local_default) in [
            ("EDITOR_USERNAME", "EDITOR_PASSWORD", Role::Editor, ("editor", "editor123")),
            ("READER_USERNAME", "READER_PASSWORD", Role::Reader, ("reader", "reader123")),
        ] {
            let username = non_blank_var(username_var);
            let password = non_blank_var(password_var);
            match (username, password) {
                (Some(username), Some(password)) => seed_users.push(SeedUser {
                    username,
                    password,
                    role,
                }),
                (None, None) if runtime == Env::Local => seed_users.push(SeedUser {
                    username: local_default.0.to_string(),
                    password: local_default.1.to_string(),
                    role,
                }),
                (None, None) => {}
                // Half an account is a typo, not an opt-out.
                (Some(_), None) => {
                    return Err(ConfigError::Invalid {
                        var: password_var,
                        value: String::new(),
                    });
                }
                (None, Some(_)) => {
                    return Err(ConfigError::Invalid {
                        var: username_var,
                        value: String::new(),
                    });
                }
            }
        }

        let token_ttl_hours: i64 = parse_var("TOKEN_TTL_HOURS", 24)?;
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&token_ttl_hours) {
            return Err(ConfigError::Invalid {
                var: "TOKEN_TTL_HOURS",
                value: token_ttl_hours.to_string(),
            });
        }

        let bcrypt_cost: u32 = parse_var("BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                var: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
            });
        }

        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            jwt_secret,
            token_ttl_hours,
            login_path: env::var("LOGIN_PATH").unwrap_or_else(|_| "/login".to_string()),
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", 5)?,
            bcrypt_cost,
            seed_users,
            public_url: env::var("PUBLIC_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            env: runtime,
        })
    }
}

fn non_blank_var(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}
