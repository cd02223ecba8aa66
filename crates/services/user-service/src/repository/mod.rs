//! Repository layer for data access.

pub mod cache;
pub mod entities;
pub mod store;
mod user_repository;

pub use cache::{
    CacheError, CacheResult, InMemoryUserCache, NoopUserCache, RedisUserCache, UserCache,
};
pub use store::{DbUserStore, InMemoryUserStore, UserStore};
pub use user_repository::{CachedUserRepository, UserRepository};

#[cfg(any(test, feature = "test-utils"))]
pub use cache::MockUserCache;
#[cfg(any(test, feature = "test-utils"))]
pub use store::MockUserStore;
#[cfg(any(test, feature = "test-utils"))]
pub use user_repository::MockUserRepository;
