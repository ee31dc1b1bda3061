use inkpost::{
    AccessGate, AppConfig, AppState, InMemoryPostRepository, InMemorySubscriberRepository,
    InMemoryUserRepository, LogMailer, RepositoryState, TokenService, UserState,
    auth::Role,
    config::SeedUser,
    create_router,
    models::{LoginResponse, Post, Profile},
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
}

async fn spawn_app() -> TestApp {
    let config = AppConfig {
        seed_users: vec![
            SeedUser {
                username: "editor".to_string(),
                password: "editor123".to_string(),
                role: Role::Editor,
            },
            SeedUser {
                username: "reader".to_string(),
                password: "reader123".to_string(),
                role: Role::Reader,
            },
        ],
        ..AppConfig::default()
    };

    let tokens = TokenService::new(&config.jwt_secret, config.token_ttl_hours)
        .expect("Failed to build token service");
    let gate = Arc::new(AccessGate::new(Arc::new(tokens), config.login_path.clone()));
    let repo = Arc::new(InMemoryPostRepository::new()) as RepositoryState;
    let users = Arc::new(
        InMemoryUserRepository::seeded(config.bcrypt_cost, &config.seed_users)
            .await
            .expect("Failed to seed users"),
    ) as UserState;

    let state = AppState {
        repo,
        users,
        subscribers: Arc::new(InMemorySubscriberRepository::new()),
        mailer: Arc::new(LogMailer::new(config.public_url.clone())),
        gate,
        config,
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address }
}

async fn login(app: &TestApp, client: &reqwest::Client, username: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/login", app.address))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), 200);
    response.json::<LoginResponse>().await.unwrap().token
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");

    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_post_lifecycle() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = login(&app, &client, "editor", "editor123").await;

    // Create twice with the same title
    let mut created = Vec::new();
    for body in ["First", "Second"] {
        let response = client
            .post(format!("{}/posts", app.address))
            .bearer_auth(&token)
            .json(&json!({ "title": "Test Post", "body": body, "summary": "s" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        created.push(response.json::<Post>().await.unwrap());
    }
    assert_eq!(created[0].slug, "test-post");
    assert_eq!(created[1].slug, "test-post-1");
    assert_eq!(created[1].author, "editor");

    // Public read
    let post: Post = client
        .get(format!("{}/posts/test-post-1", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(post, created[1]);

    // Delete the first and reuse its slug
    let response = client
        .delete(format!("{}/posts/test-post", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let response = client
        .post(format!("{}/posts", app.address))
        .bearer_auth(&token)
        .json(&json!({ "title": "Test Post", "body": "Third" }))
        .send()
        .await
        .unwrap();
    let third: Post = response.json().await.unwrap();
    assert_eq!(third.slug, "test-post");
    assert!(third.id > created[1].id);

    let all: Vec<Post> = client
        .get(format!("{}/posts", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let slugs: Vec<_> = all.iter().map(|p| p.slug.as_str()).collect();
    assert_eq!(slugs, ["test-post-1", "test-post"]);
}

#[tokio::test]
async fn test_reader_session_via_cookie() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = login(&app, &client, "reader", "reader123").await;

    let profile: Profile = client
        .get(format!("{}/me", app.address))
        .header("Cookie", format!("jwt={token}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(profile.username, "reader");
    assert_eq!(profile.role, Role::Reader);

    let response = client
        .post(format!("{}/posts", app.address))
        .header("Cookie", format!("jwt={token}"))
        .json(&json!({ "title": "Nope", "body": "Nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_concurrent_creates_over_http_get_unique_slugs() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = login(&app, &client, "editor", "editor123").await;

    let requests = (0..10).map(|i| {
        let client = client.clone();
        let url = format!("{}/posts", app.address);
        let token = token.clone();
        tokio::spawn(async move {
            client
                .post(url)
                .bearer_auth(token)
                .json(&json!({ "title": "Same Title", "body": format!("#{i}") }))
                .send()
                .await
                .unwrap()
                .json::<Post>()
                .await
                .unwrap()
        })
    });

    let mut slugs = Vec::new();
    for handle in requests.collect::<Vec<_>>() {
        slugs.push(handle.await.unwrap().slug);
    }
    slugs.sort();
    slugs.dedup();
    assert_eq!(slugs.len(), 10);
}
