//! Account service - account lifecycle, login and the follow graph.
//!
//! The caller identity is resolved by the transport layer; every
//! authenticated operation receives it as `caller_id`.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use tracing::instrument;

use crate::auth::{IssuedToken, TokenService};
use crate::repository::UserRepository;
use common::{AppError, AppResult};
use domain::{HashCost, NewUser, NewUserRecord, Password, Profile, User, UserChanges, UserView};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Plain text hashed once to give unknown-email logins a real hash to verify against.
const DUMMY_PASSWORD: &str = "dummy-password-for-unknown-accounts";

/// Account service trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Validate, hash and persist a new account
    async fn create_user(&self, candidate: NewUser) -> AppResult<UserView>;

    /// Exchange credentials for a bearer token
    async fn login(&self, email: String, password: String) -> AppResult<IssuedToken>;

    async fn get_current_user(&self, caller_id: i64) -> AppResult<UserView>;

    /// Apply the supplied non-empty fields to the caller's account
    async fn update_current_user(&self, caller_id: i64, changes: UserChanges)
        -> AppResult<UserView>;

    async fn get_profile(&self, caller_id: i64, username: String) -> AppResult<Profile>;

    async fn follow_user(&self, caller_id: i64, username: String) -> AppResult<Profile>;

    async fn unfollow_user(&self, caller_id: i64, username: String) -> AppResult<Profile>;
}

/// Concrete implementation of AccountService using the user repository.
pub struct AccountManager {
    repo: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    hash_cost: HashCost,
    dummy_hash: OnceCell<Password>,
}

impl AccountManager {
    pub fn new(repo: Arc<dyn UserRepository>, tokens: Arc<TokenService>, hash_cost: HashCost) -> Self {
        Self {
            repo,
            tokens,
            hash_cost,
            dummy_hash: OnceCell::new(),
        }
    }

    fn hash_password(&self, plain_text: &str) -> AppResult<Password> {
        Ok(Password::hash_with(plain_text, &self.hash_cost)?)
    }

    fn dummy_hash(&self) -> AppResult<&Password> {
        self.dummy_hash
            .get_or_try_init(|| self.hash_password(DUMMY_PASSWORD))
    }

    /// Load the caller and the target, rejecting a target that is the caller.
    async fn load_pair(&self, caller_id: i64, username: &str) -> AppResult<(User, User)> {
        let caller = self.repo.get_by_id(caller_id).await?;
        if caller.username == username {
            return Err(AppError::SelfReference);
        }

        let target = self.repo.get_by_username(username).await?;
        if target.id == caller.id {
            return Err(AppError::SelfReference);
        }

        Ok((caller, target))
    }
}

#[async_trait]
impl AccountService for AccountManager {
    #[instrument(skip(self))]
    async fn create_user(&self, candidate: NewUser) -> AppResult<UserView> {
        candidate.validate_fields()?;

        let password_hash = self.hash_password(&candidate.password)?.into_string();

        let user = self
            .repo
            .create(NewUserRecord {
                username: candidate.username,
                email: candidate.email,
                password_hash,
            })
            .await
            .map_err(|e| e.into_write_failure("create user"))?;

        tracing::info!(user_id = user.id, "user created");
        Ok(UserView::from(user))
    }

    #[instrument(skip(self, password))]
    async fn login(&self, email: String, password: String) -> AppResult<IssuedToken> {
        let user = match self.repo.get_by_email(&email).await {
            Ok(user) => Some(user),
            Err(AppError::NotFound) => None,
            Err(e) => return Err(e),
        };

        // Verify even when the email is unknown so both failures cost the same
        let password_valid = match &user {
            Some(user) => Password::from_hash(user.password_hash.as_str()).verify(&password),
            None => {
                self.dummy_hash()?.verify(&password);
                false
            }
        };

        match user {
            Some(user) if password_valid => self.tokens.issue(user.id),
            _ => Err(AppError::InvalidCredentials),
        }
    }

    #[instrument(skip(self))]
    async fn get_current_user(&self, caller_id: i64) -> AppResult<UserView> {
        let user = self.repo.get_by_id(caller_id).await?;
        Ok(UserView::from(user))
    }

    #[instrument(skip(self))]
    async fn update_current_user(
        &self,
        caller_id: i64,
        changes: UserChanges,
    ) -> AppResult<UserView> {
        let mut user = self.repo.get_by_id(caller_id).await?;

        if let Some(password) = user.apply_changes(changes) {
            user.password_hash = self.hash_password(&password)?.into_string();
        }
        user.validate_fields()?;

        let user = self
            .repo
            .update(&user)
            .await
            .map_err(|e| e.into_write_failure("update user"))?;

        Ok(UserView::from(user))
    }

    #[instrument(skip(self))]
    async fn get_profile(&self, caller_id: i64, username: String) -> AppResult<Profile> {
        let caller = self.repo.get_by_id(caller_id).await?;
        let target = self.repo.get_by_username(&username).await?;
        let following = self.repo.is_following(caller.id, target.id).await?;

        Ok(Profile::of(target, following))
    }

    #[instrument(skip(self))]
    async fn follow_user(&self, caller_id: i64, username: String) -> AppResult<Profile> {
        let (caller, target) = self.load_pair(caller_id, &username).await?;

        self.repo
            .follow(caller.id, target.id)
            .await
            .map_err(|e| e.into_write_failure("follow user"))?;

        Ok(Profile::of(target, true))
    }

    #[instrument(skip(self))]
    async fn unfollow_user(&self, caller_id: i64, username: String) -> AppResult<Profile> {
        let (caller, target) = self.load_pair(caller_id, &username).await?;

        if !self.repo.is_following(caller.id, target.id).await? {
            return Err(AppError::NotFollowing);
        }

        self.repo
            .unfollow(caller.id, target.id)
            .await
            .map_err(|e| e.into_write_failure("unfollow user"))?;

        Ok(Profile::of(target, false))
    }
}
