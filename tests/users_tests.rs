use inkpost::{
    auth::Role,
    config::SeedUser,
    users::{InMemoryUserRepository, LoginError, UserRepository},
};

const TEST_COST: u32 = 4;

#[tokio::test]
async fn test_authenticate_with_correct_password() {
    let users = InMemoryUserRepository::new(TEST_COST);
    users.create("alice", "hunter2", Role::Editor).await.unwrap();

    let user = users.authenticate("alice", "hunter2").await.unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(user.role, Role::Editor);
    assert_ne!(user.password_hash, "hunter2");
}

#[tokio::test]
async fn test_wrong_password_and_unknown_user_look_the_same() {
    let users = InMemoryUserRepository::new(TEST_COST);
    users.create("alice", "hunter2", Role::Reader).await.unwrap();

    let wrong = users.authenticate("alice", "nope").await.unwrap_err();
    let unknown = users.authenticate("mallory", "hunter2").await.unwrap_err();

    assert!(matches!(wrong, LoginError::InvalidCredentials));
    assert!(matches!(unknown, LoginError::InvalidCredentials));
    assert_eq!(wrong.to_string(), unknown.to_string());
}

#[tokio::test]
async fn test_duplicate_username_is_rejected() {
    let users = InMemoryUserRepository::new(TEST_COST);
    users.create("alice", "one", Role::Reader).await.unwrap();

    let err = users.create("alice", "two", Role::Editor).await.unwrap_err();
    assert!(matches!(err, LoginError::UserExists));

    // The original account is untouched.
    let user = users.authenticate("alice", "one").await.unwrap();
    assert_eq!(user.role, Role::Reader);
}

#[tokio::test]
async fn test_seeded_store_contains_every_seed() {
    let seeds = [
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
    ];
    let users = InMemoryUserRepository::seeded(TEST_COST, &seeds).await.unwrap();

    for seed in &seeds {
        let user = users.authenticate(&seed.username, &seed.password).await.unwrap();
        assert_eq!(user.role, seed.role);
    }
}
