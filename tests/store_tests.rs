use inkpost::{
    models::{NewPost, PostPatch},
    repository::{InMemoryPostRepository, PostRepository, StoreError},
    slug::{FALLBACK_SLUG, slugify, unique_slug},
};
use std::{collections::HashSet, sync::Arc};
use tokio_util::sync::CancellationToken;

// --- Helper Functions ---

fn draft(title: &str) -> NewPost {
    NewPost {
        title: title.to_string(),
        body: format!("Body of {title}"),
        summary: String::new(),
        author: "alice".to_string(),
    }
}

fn live() -> CancellationToken {
    CancellationToken::new()
}

fn cancelled() -> CancellationToken {
    let token = CancellationToken::new();
    token.cancel();
    token
}

// --- Slug Derivation ---

#[test]
fn test_slugify_normalizes_titles() {
    assert_eq!(slugify("Test Post"), "test-post");
    assert_eq!(slugify("Hello, World!"), "hello-world");
    assert_eq!(slugify("  Leading and trailing  "), "leading-and-trailing");
    assert_eq!(slugify("Multiple   spaces -- and-hyphens"), "multiple-spaces-and-hyphens");
    assert_eq!(slugify("Rust 2024 Edition"), "rust-2024-edition");
    assert_eq!(slugify("Café Ünïcode"), "caf-ncode");
}

#[test]
fn test_slugify_falls_back_when_nothing_survives() {
    assert_eq!(slugify(""), FALLBACK_SLUG);
    assert_eq!(slugify("!!!"), FALLBACK_SLUG);
    assert_eq!(slugify("---"), FALLBACK_SLUG);
}

#[test]
fn test_unique_slug_appends_lowest_free_suffix() {
    let taken: HashSet<&str> = ["test-post", "test-post-1", "test-post-3"].into();

    assert_eq!(unique_slug("fresh", |c| taken.contains(c)), "fresh");
    assert_eq!(unique_slug("test-post", |c| taken.contains(c)), "test-post-2");
}

// --- Create / Read ---

#[tokio::test]
async fn test_create_assigns_ids_slugs_and_timestamps() {
    let store = InMemoryPostRepository::new();

    let first = store.create(draft("Test Post"), &live()).await.unwrap();
    let second = store.create(draft("Test Post"), &live()).await.unwrap();
    let third = store.create(draft("Test Post"), &live()).await.unwrap();

    assert_eq!(first.slug, "test-post");
    assert_eq!(second.slug, "test-post-1");
    assert_eq!(third.slug, "test-post-2");

    assert!(first.id < second.id && second.id < third.id);
    assert_eq!(first.created_at, first.updated_at);
    assert_eq!(first.author, "alice");
}

#[tokio::test]
async fn test_lookup_by_id_and_slug_return_the_same_post() {
    let store = InMemoryPostRepository::new();
    let created = store.create(draft("Lookup Me"), &live()).await.unwrap();

    let by_id = store.get_by_id(created.id, &live()).await.unwrap();
    let by_slug = store.get_by_slug("lookup-me", &live()).await.unwrap();

    assert_eq!(by_id, created);
    assert_eq!(by_slug, created);
}

#[tokio::test]
async fn test_unknown_id_and_slug_are_not_found() {
    let store = InMemoryPostRepository::new();

    assert_eq!(store.get_by_id(42, &live()).await, Err(StoreError::NotFound));
    assert_eq!(
        store.get_by_slug("missing", &live()).await,
        Err(StoreError::NotFound)
    );
    assert_eq!(
        store.update(42, PostPatch::default(), &live()).await,
        Err(StoreError::NotFound)
    );
    assert_eq!(store.delete(42, &live()).await, Err(StoreError::NotFound));
}

#[tokio::test]
async fn test_get_all_is_an_ordered_snapshot() {
    let store = InMemoryPostRepository::new();
    store.create(draft("One"), &live()).await.unwrap();
    let two = store.create(draft("Two"), &live()).await.unwrap();

    let snapshot = store.get_all(&live()).await.unwrap();
    store.delete(two.id, &live()).await.unwrap();
    store.create(draft("Three"), &live()).await.unwrap();

    let slugs: Vec<_> = snapshot.iter().map(|p| p.slug.as_str()).collect();
    assert_eq!(slugs, ["one", "two"]);

    let current: Vec<_> = store
        .get_all(&live())
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.slug)
        .collect();
    assert_eq!(current, ["one", "three"]);
}

// --- Update ---

#[tokio::test]
async fn test_update_without_title_change_keeps_slug() {
    let store = InMemoryPostRepository::new();
    let post = store.create(draft("Stable Title"), &live()).await.unwrap();

    let patch = PostPatch {
        title: Some("Stable Title".to_string()),
        body: Some("New body".to_string()),
        summary: None,
    };
    let updated = store.update(post.id, patch, &live()).await.unwrap();

    assert_eq!(updated.slug, "stable-title");
    assert_eq!(updated.body, "New body");
    assert!(updated.updated_at >= post.updated_at);
    assert_eq!(updated.created_at, post.created_at);
}

#[tokio::test]
async fn test_update_never_collides_with_own_slug() {
    let store = InMemoryPostRepository::new();
    let post = store.create(draft("Hello World"), &live()).await.unwrap();

    // Different title, same derived slug.
    let patch = PostPatch {
        title: Some("Hello, World!".to_string()),
        ..Default::default()
    };
    let updated = store.update(post.id, patch, &live()).await.unwrap();

    assert_eq!(updated.slug, "hello-world");
    assert_eq!(updated.title, "Hello, World!");
}

#[tokio::test]
async fn test_title_change_moves_slug_and_frees_the_old_one() {
    let store = InMemoryPostRepository::new();
    let post = store.create(draft("Draft Name"), &live()).await.unwrap();
    store.create(draft("Final Name"), &live()).await.unwrap();

    let patch = PostPatch {
        title: Some("Final Name".to_string()),
        ..Default::default()
    };
    let updated = store.update(post.id, patch, &live()).await.unwrap();

    assert_eq!(updated.slug, "final-name-1");
    assert_eq!(
        store.get_by_slug("draft-name", &live()).await,
        Err(StoreError::NotFound)
    );
    assert_eq!(
        store.get_by_slug("final-name-1", &live()).await.unwrap().id,
        post.id
    );

    let reused = store.create(draft("Draft Name"), &live()).await.unwrap();
    assert_eq!(reused.slug, "draft-name");
}

// --- Delete ---

#[tokio::test]
async fn test_delete_frees_slug_but_never_reuses_id() {
    let store = InMemoryPostRepository::new();
    let first = store.create(draft("Test Post"), &live()).await.unwrap();
    let second = store.create(draft("Test Post"), &live()).await.unwrap();
    assert_eq!(second.slug, "test-post-1");

    store.delete(first.id, &live()).await.unwrap();
    let third = store.create(draft("Test Post"), &live()).await.unwrap();

    assert_eq!(third.slug, "test-post");
    assert!(third.id > second.id);
    assert_eq!(
        store.get_by_id(first.id, &live()).await,
        Err(StoreError::NotFound)
    );
}

// --- Cancellation ---

#[tokio::test]
async fn test_cancelled_token_short_circuits_every_operation() {
    let store = InMemoryPostRepository::new();
    let post = store.create(draft("Keep Me"), &live()).await.unwrap();
    let cancel = cancelled();

    assert_eq!(
        store.create(draft("Never Stored"), &cancel).await,
        Err(StoreError::Cancelled)
    );
    assert_eq!(store.get_by_id(post.id, &cancel).await, Err(StoreError::Cancelled));
    assert_eq!(
        store.get_by_slug("keep-me", &cancel).await,
        Err(StoreError::Cancelled)
    );
    assert_eq!(store.get_all(&cancel).await, Err(StoreError::Cancelled));
    assert_eq!(
        store
            .update(post.id, PostPatch::default(), &cancel)
            .await,
        Err(StoreError::Cancelled)
    );
    assert_eq!(store.delete(post.id, &cancel).await, Err(StoreError::Cancelled));

    // Nothing was touched.
    let all = store.get_all(&live()).await.unwrap();
    assert_eq!(all, vec![post]);
}

#[tokio::test]
async fn test_cancelled_create_does_not_consume_an_id() {
    let store = InMemoryPostRepository::new();
    let first = store.create(draft("A"), &live()).await.unwrap();
    let _ = store.create(draft("B"), &cancelled()).await;
    let second = store.create(draft("C"), &live()).await.unwrap();

    assert_eq!(second.id, first.id + 1);
}

// --- Concurrency ---

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_with_one_title_get_distinct_slugs() {
    let store = Arc::new(InMemoryPostRepository::new());

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.create(draft("Test Post"), &live()).await })
        })
        .collect();

    let mut slugs = HashSet::new();
    let mut ids = HashSet::new();
    for handle in handles {
        let post = handle.await.unwrap().unwrap();
        ids.insert(post.id);
        slugs.insert(post.slug);
    }

    assert_eq!(ids.len(), 10);
    assert_eq!(slugs.len(), 10);
    assert!(slugs.contains("test-post"));
    for n in 1..10 {
        assert!(slugs.contains(&format!("test-post-{n}")));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_with_distinct_titles_lose_nothing() {
    let store = Arc::new(InMemoryPostRepository::new());

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.create(draft(&format!("Post {i}")), &live()).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = store.get_all(&live()).await.unwrap();
    let ids: HashSet<_> = all.iter().map(|p| p.id).collect();
    let slugs: HashSet<_> = all.iter().map(|p| p.slug.clone()).collect();
    let expected: HashSet<_> = (0..10).map(|i| format!("post-{i}")).collect();
    assert_eq!(all.len(), 10);
    assert_eq!(ids.len(), 10);
    assert_eq!(slugs, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_a_partial_post() {
    let store = Arc::new(InMemoryPostRepository::new());

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                store.create(draft("Shared"), &live()).await.unwrap();
            }
        })
    };

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let snapshot = store.get_all(&live()).await.unwrap();
                let slugs: HashSet<_> = snapshot.iter().map(|p| p.slug.clone()).collect();
                assert_eq!(slugs.len(), snapshot.len(), "duplicate slug observed");
                assert!(snapshot.iter().all(|p| !p.slug.is_empty() && p.id > 0));
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
    assert_eq!(store.get_all(&live()).await.unwrap().len(), 50);
}
