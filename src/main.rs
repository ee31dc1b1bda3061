use inkpost::{
    AccessGate, AppState, InMemoryPostRepository, InMemorySubscriberRepository,
    InMemoryUserRepository, LogMailer, MailerState, RepositoryState, SubscriberState,
    TokenService, UserState,
    config::{AppConfig, Env},
    create_router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, the token service, both stores and the
/// HTTP server. Any configuration problem aborts startup.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast)
    dotenv::dotenv().ok();
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    // 2. Logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "inkpost=debug,tower_http=info,axum=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Token service and gate
    let tokens = match TokenService::new(&config.jwt_secret, config.token_ttl_hours) {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::error!("FATAL: {e}");
            std::process::exit(1);
        }
    };
    let gate = Arc::new(AccessGate::new(Arc::new(tokens), config.login_path.clone()));

    // 4. Stores
    let repo = Arc::new(InMemoryPostRepository::new()) as RepositoryState;
    let users = match InMemoryUserRepository::seeded(config.bcrypt_cost, &config.seed_users).await
    {
        Ok(users) => users,
        Err(e) => {
            tracing::error!("FATAL: failed to seed user accounts: {e}");
            std::process::exit(1);
        }
    };
    if config.seed_users.is_empty() {
        tracing::warn!("No accounts configured; nobody can sign in.");
    }
    let users = Arc::new(users) as UserState;
    let subscribers = Arc::new(InMemorySubscriberRepository::new()) as SubscriberState;
    // No mail transport yet: confirmation links are logged.
    let mailer = Arc::new(LogMailer::new(config.public_url.clone())) as MailerState;

    // 5. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        users,
        subscribers,
        mailer,
        gate,
        config,
    };

    // 6. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: failed to bind {bind_addr}: {e}"));

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
    }
}
