use crate::models::{NewPost, Post, PostPatch};
use crate::slug;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

/// StoreError
///
/// The only failures a store operation reports. Slug collisions are never an
/// error: they are resolved internally by suffixing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("post not found")]
    NotFound,
    /// The caller's cancellation token fired before the operation took the lock.
    #[error("operation cancelled")]
    Cancelled,
}

/// PostRepository Trait
///
/// The storage-agnostic content contract. Handlers only ever see
/// `Arc<dyn PostRepository>`, so an in-memory map, a relational table or a
/// flat-file tree can sit behind it as long as it honours the same rules:
/// unique ids that are never reused, and slugs that are unique among live posts.
///
/// Every operation takes a cancellation token. An operation whose token has
/// fired before it enters its critical section returns `StoreError::Cancelled`
/// without touching state; once inside, it always runs to completion.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Assigns id, slug and both timestamps, then stores the draft.
    async fn create(&self, draft: NewPost, cancel: &CancellationToken) -> Result<Post, StoreError>;

    async fn get_by_id(&self, id: u64, cancel: &CancellationToken) -> Result<Post, StoreError>;

    async fn get_by_slug(&self, slug: &str, cancel: &CancellationToken)
    -> Result<Post, StoreError>;

    /// A snapshot in id order. Later mutations do not affect the returned vector.
    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<Post>, StoreError>;

    /// Applies `patch`. A title change re-derives the slug, with the post's own
    /// current slug excluded from the collision set.
    async fn update(
        &self,
        id: u64,
        patch: PostPatch,
        cancel: &CancellationToken,
    ) -> Result<Post, StoreError>;

    /// Removes the post. Its slug becomes free for any later `create`.
    async fn delete(&self, id: u64, cancel: &CancellationToken) -> Result<(), StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the content store across the application state.
pub type RepositoryState = Arc<dyn PostRepository>;

/// Everything guarded by the store lock. `slugs` is an index over `posts` and
/// is only ever changed together with it.
#[derive(Debug)]
struct Collection {
    posts: BTreeMap<u64, Post>,
    slugs: HashMap<String, u64>,
    next_id: u64,
}

/// InMemoryPostRepository
///
/// The in-process implementation of `PostRepository`: one coarse reader/writer
/// lock over the whole collection. Reads share the lock; create, update and
/// delete hold it exclusively for the slug check and the mutation together.
/// Nothing inside the lock awaits or performs I/O.
#[derive(Debug)]
pub struct InMemoryPostRepository {
    inner: RwLock<Collection>,
}

impl Default for InMemoryPostRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPostRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Collection {
                posts: BTreeMap::new(),
                slugs: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    async fn read(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RwLockReadGuard<'_, Collection>, StoreError> {
        read_or_cancel(&self.inner, cancel)
            .await
            .ok_or(StoreError::Cancelled)
    }

    async fn write(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RwLockWriteGuard<'_, Collection>, StoreError> {
        write_or_cancel(&self.inner, cancel)
            .await
            .ok_or(StoreError::Cancelled)
    }
}

/// Waits for shared access to `lock` unless `cancel` fires first. `None` means
/// cancelled; the lock was never taken.
pub(crate) async fn read_or_cancel<'a, T>(
    lock: &'a RwLock<T>,
    cancel: &CancellationToken,
) -> Option<RwLockReadGuard<'a, T>> {
    if cancel.is_cancelled() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        guard = lock.read() => Some(guard),
    }
}

/// Exclusive counterpart of [`read_or_cancel`].
pub(crate) async fn write_or_cancel<'a, T>(
    lock: &'a RwLock<T>,
    cancel: &CancellationToken,
) -> Option<RwLockWriteGuard<'a, T>> {
    if cancel.is_cancelled() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        guard = lock.write() => Some(guard),
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    /// create
    ///
    /// Id assignment, slug allocation and the insert share one critical section,
    /// so no reader ever observes a partially assigned post.
    async fn create(&self, draft: NewPost, cancel: &CancellationToken) -> Result<Post, StoreError> {
        let mut collection = self.write(cancel).await?;

        let base = slug::slugify(&draft.title);
        let slug = slug::unique_slug(&base, |candidate| collection.slugs.contains_key(candidate));

        let id = collection.next_id;
        collection.next_id += 1;

        let now = Utc::now();
        let post = Post {
            id,
            title: draft.title,
            body: draft.body,
            summary: draft.summary,
            author: draft.author,
            slug,
            created_at: now,
            updated_at: now,
        };

        collection.slugs.insert(post.slug.clone(), id);
        collection.posts.insert(id, post.clone());
        tracing::debug!(id, slug = %post.slug, "post created");
        Ok(post)
    }

    async fn get_by_id(&self, id: u64, cancel: &CancellationToken) -> Result<Post, StoreError> {
        let collection = self.read(cancel).await?;
        collection.posts.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_by_slug(
        &self,
        slug: &str,
        cancel: &CancellationToken,
    ) -> Result<Post, StoreError> {
        let collection = self.read(cancel).await?;
        collection
            .slugs
            .get(slug)
            .and_then(|id| collection.posts.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<Post>, StoreError> {
        let collection = self.read(cancel).await?;
        Ok(collection.posts.values().cloned().collect())
    }

    async fn update(
        &self,
        id: u64,
        patch: PostPatch,
        cancel: &CancellationToken,
    ) -> Result<Post, StoreError> {
        let mut guard = self.write(cancel).await?;
        let collection = &mut *guard;

        let post = collection.posts.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(title) = patch.title {
            if title != post.title {
                let base = slug::slugify(&title);
                let own = post.slug.as_str();
                let slugs = &collection.slugs;
                // A post never collides with its own current slug.
                let next = slug::unique_slug(&base, |candidate| {
                    candidate != own && slugs.contains_key(candidate)
                });
                if next != post.slug {
                    collection.slugs.remove(&post.slug);
                    collection.slugs.insert(next.clone(), id);
                    tracing::debug!(id, from = %post.slug, to = %next, "post slug changed");
                    post.slug = next;
                }
            }
            post.title = title;
        }
        if let Some(body) = patch.body {
            post.body = body;
        }
        if let Some(summary) = patch.summary {
            post.summary = summary;
        }
        post.updated_at = Utc::now();

        Ok(post.clone())
    }

    async fn delete(&self, id: u64, cancel: &CancellationToken) -> Result<(), StoreError> {
        let mut collection = self.write(cancel).await?;
        let post = collection.posts.remove(&id).ok_or(StoreError::NotFound)?;
        collection.slugs.remove(&post.slug);
        tracing::debug!(id, slug = %post.slug, "post deleted");
        Ok(())
    }
}
