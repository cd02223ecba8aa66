//! User repository: the store fronted by a read-through cache.
//!
//! Only `get_by_id` reads through the cache. `update` drops the cached
//! snapshot before the store write so a concurrent reader cannot refill it
//! with the old row after the commit. Cache failures never reach callers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use super::cache::{CacheError, UserCache};
use super::store::UserStore;
use common::AppResult;
use domain::{NewUserRecord, User, USER_CACHE_TTL_SECONDS};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// User repository trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, record: NewUserRecord) -> AppResult<User>;

    /// Cache-first lookup by identity
    async fn get_by_id(&self, id: i64) -> AppResult<User>;

    async fn get_by_email(&self, email: &str) -> AppResult<User>;

    async fn get_by_username(&self, username: &str) -> AppResult<User>;

    /// Invalidate the cached snapshot, then write through to the store
    async fn update(&self, user: &User) -> AppResult<User>;

    async fn is_following(&self, follower_id: i64, followee_id: i64) -> AppResult<bool>;

    async fn follow(&self, follower_id: i64, followee_id: i64) -> AppResult<()>;

    async fn unfollow(&self, follower_id: i64, followee_id: i64) -> AppResult<()>;
}

/// Concrete implementation of UserRepository over a store and a cache
pub struct CachedUserRepository {
    store: Arc<dyn UserStore>,
    cache: Arc<dyn UserCache>,
    ttl: Duration,
}

impl CachedUserRepository {
    /// Create a repository whose snapshots live for one hour
    pub fn new(store: Arc<dyn UserStore>, cache: Arc<dyn UserCache>) -> Self {
        Self {
            store,
            cache,
            ttl: Duration::from_secs(USER_CACHE_TTL_SECONDS),
        }
    }
}

fn cache_key(id: i64) -> String {
    id.to_string()
}

#[async_trait]
impl UserRepository for CachedUserRepository {
    #[instrument(skip_all)]
    async fn create(&self, record: NewUserRecord) -> AppResult<User> {
        self.store.create(record).await
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: i64) -> AppResult<User> {
        let key = cache_key(id);

        match self.cache.get(&key).await {
            Ok(user) => {
                tracing::debug!("user cache hit");
                return Ok(user);
            }
            Err(CacheError::Miss) => tracing::debug!("user cache miss"),
            Err(e) => tracing::warn!(error = %e, "user cache read failed, using store"),
        }

        let user = self.store.get_by_id(id).await?;

        if let Err(e) = self.cache.set(&key, self.ttl, &user).await {
            tracing::warn!(error = %e, "failed to populate user cache");
        }

        Ok(user)
    }

    #[instrument(skip(self))]
    async fn get_by_email(&self, email: &str) -> AppResult<User> {
        self.store.get_by_email(email).await
    }

    #[instrument(skip(self))]
    async fn get_by_username(&self, username: &str) -> AppResult<User> {
        self.store.get_by_username(username).await
    }

    #[instrument(skip_all, fields(id = user.id))]
    async fn update(&self, user: &User) -> AppResult<User> {
        if let Err(e) = self.cache.delete(&cache_key(user.id)).await {
            tracing::warn!(error = %e, "failed to invalidate user cache");
        }

        self.store.update(user).await
    }

    #[instrument(skip(self))]
    async fn is_following(&self, follower_id: i64, followee_id: i64) -> AppResult<bool> {
        self.store.is_following(follower_id, followee_id).await
    }

    #[instrument(skip(self))]
    async fn follow(&self, follower_id: i64, followee_id: i64) -> AppResult<()> {
        self.store.follow(follower_id, followee_id).await
    }

    #[instrument(skip(self))]
    async fn unfollow(&self, follower_id: i64, followee_id: i64) -> AppResult<()> {
        self.store.unfollow(follower_id, followee_id).await
    }
}
