//! Durable storage for users and the follow graph.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Set, SqlErr,
};
use tokio::sync::RwLock;

use super::entities::{follow, user};
use common::{AppError, AppResult, OptionExt};
use domain::{NewUserRecord, User};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// User store trait for dependency injection.
///
/// Lookups fail with `AppError::NotFound` when no row matches.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user; duplicate username or email is a `Conflict`
    async fn create(&self, record: NewUserRecord) -> AppResult<User>;

    /// Overwrite an existing user by ID
    async fn update(&self, user: &User) -> AppResult<User>;

    async fn get_by_id(&self, id: i64) -> AppResult<User>;

    async fn get_by_email(&self, email: &str) -> AppResult<User>;

    async fn get_by_username(&self, username: &str) -> AppResult<User>;

    /// Edge existence; false when either side is unassigned
    async fn is_following(&self, follower_id: i64, followee_id: i64) -> AppResult<bool>;

    /// Insert the edge; an existing edge is left as is
    async fn follow(&self, follower_id: i64, followee_id: i64) -> AppResult<()>;

    /// Delete the edge if present
    async fn unfollow(&self, follower_id: i64, followee_id: i64) -> AppResult<()>;
}

// =============================================================================
// Postgres
// =============================================================================

/// SeaORM-backed implementation of UserStore
pub struct DbUserStore {
    db: DatabaseConnection,
}

impl DbUserStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for DbUserStore {
    async fn create(&self, record: NewUserRecord) -> AppResult<User> {
        let now = Utc::now();
        let active_model = user::ActiveModel {
            username: Set(record.username),
            email: Set(record.email),
            password_hash: Set(record.password_hash),
            bio: Set(None),
            image: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active_model.insert(&self.db).await?;
        Ok(User::from(model))
    }

    async fn update(&self, user: &User) -> AppResult<User> {
        let active_model = user::ActiveModel {
            id: Unchanged(user.id),
            username: Set(user.username.clone()),
            email: Set(user.email.clone()),
            password_hash: Set(user.password_hash.clone()),
            bio: Set(user.bio.clone()),
            image: Set(user.image.clone()),
            created_at: Unchanged(user.created_at),
            updated_at: Set(user.updated_at),
        };

        // RecordNotUpdated converts to NotFound
        let model = active_model.update(&self.db).await?;
        Ok(User::from(model))
    }

    async fn get_by_id(&self, id: i64) -> AppResult<User> {
        user::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(User::from)
            .ok_or_not_found()
    }

    async fn get_by_email(&self, email: &str) -> AppResult<User> {
        user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?
            .map(User::from)
            .ok_or_not_found()
    }

    async fn get_by_username(&self, username: &str) -> AppResult<User> {
        user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?
            .map(User::from)
            .ok_or_not_found()
    }

    async fn is_following(&self, follower_id: i64, followee_id: i64) -> AppResult<bool> {
        if follower_id <= 0 || followee_id <= 0 {
            return Ok(false);
        }

        let edge = follow::Entity::find_by_id((follower_id, followee_id))
            .one(&self.db)
            .await?;

        Ok(edge.is_some())
    }

    async fn follow(&self, follower_id: i64, followee_id: i64) -> AppResult<()> {
        let edge = follow::ActiveModel {
            follower_id: Set(follower_id),
            followee_id: Set(followee_id),
            created_at: Set(Utc::now()),
        };

        match follow::Entity::insert(edge).exec(&self.db).await {
            Ok(_) => Ok(()),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    tracing::debug!(follower_id, followee_id, "follow edge already present");
                    Ok(())
                }
                Some(SqlErr::ForeignKeyConstraintViolation(_)) => Err(AppError::NotFound),
                _ => Err(err.into()),
            },
        }
    }

    async fn unfollow(&self, follower_id: i64, followee_id: i64) -> AppResult<()> {
        follow::Entity::delete_many()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::FolloweeId.eq(followee_id))
            .exec(&self.db)
            .await?;

        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    follows: HashSet<(i64, i64)>,
    last_id: i64,
}

impl Tables {
    /// Uniqueness check against every user except `except_id`.
    fn check_unique(&self, username: &str, email: &str, except_id: i64) -> AppResult<()> {
        let others = self.users.values().filter(|u| u.id != except_id);
        for other in others {
            if other.username == username {
                return Err(AppError::conflict("Username"));
            }
            if other.email == email {
                return Err(AppError::conflict("Email"));
            }
        }
        Ok(())
    }

    fn find_by(&self, pred: impl Fn(&User) -> bool) -> AppResult<User> {
        self.users.values().find(|u| pred(u)).cloned().ok_or_not_found()
    }
}

/// Process-local store with the same constraints as the database schema.
///
/// Backs `serve --ephemeral` and the test suites.
#[derive(Default)]
pub struct InMemoryUserStore {
    tables: RwLock<Tables>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, record: NewUserRecord) -> AppResult<User> {
        let mut tables = self.tables.write().await;
        tables.check_unique(&record.username, &record.email, 0)?;

        tables.last_id += 1;
        let now = Utc::now();
        let user = User {
            id: tables.last_id,
            username: record.username,
            email: record.email,
            password_hash: record.password_hash,
            bio: None,
            image: None,
            created_at: now,
            updated_at: now,
        };

        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: &User) -> AppResult<User> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user.id) {
            return Err(AppError::NotFound);
        }
        tables.check_unique(&user.username, &user.email, user.id)?;

        let stored = tables.users.get_mut(&user.id).ok_or_not_found()?;
        let created_at = stored.created_at;
        *stored = User {
            created_at,
            ..user.clone()
        };

        Ok(stored.clone())
    }

    async fn get_by_id(&self, id: i64) -> AppResult<User> {
        self.tables.read().await.users.get(&id).cloned().ok_or_not_found()
    }

    async fn get_by_email(&self, email: &str) -> AppResult<User> {
        self.tables.read().await.find_by(|u| u.email == email)
    }

    async fn get_by_username(&self, username: &str) -> AppResult<User> {
        self.tables.read().await.find_by(|u| u.username == username)
    }

    async fn is_following(&self, follower_id: i64, followee_id: i64) -> AppResult<bool> {
        if follower_id <= 0 || followee_id <= 0 {
            return Ok(false);
        }
        Ok(self
            .tables
            .read()
            .await
            .follows
            .contains(&(follower_id, followee_id)))
    }

    async fn follow(&self, follower_id: i64, followee_id: i64) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&follower_id) || !tables.users.contains_key(&followee_id) {
            return Err(AppError::NotFound);
        }
        tables.follows.insert((follower_id, followee_id));
        Ok(())
    }

    async fn unfollow(&self, follower_id: i64, followee_id: i64) -> AppResult<()> {
        self.tables
            .write()
            .await
            .follows
            .remove(&(follower_id, followee_id));
        Ok(())
    }
}
