//! User domain entity and related types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::DomainResult;
use crate::validation::validate_account;

/// User domain entity.
///
/// Serialized snapshots (the cache) carry the password hash, never the
/// plain text. `Debug` redacts it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct User {
    /// Surrogate identity assigned by the store
    pub id: i64,
    #[validate(length(min = 1, message = "is required"))]
    pub username: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password_hash: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("bio", &self.bio)
            .field("image", &self.image)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl User {
    /// Check the entity invariants (username, email, stored hash).
    pub fn validate_fields(&self) -> DomainResult<()> {
        validate_account(self, &self.username)
    }

    /// Apply a partial update in place.
    ///
    /// Absent or empty fields are left untouched. Returns the new plain
    /// text password when one was supplied; the caller must hash it and
    /// store the result in `password_hash`.
    pub fn apply_changes(&mut self, changes: UserChanges) -> Option<String> {
        let UserChanges {
            username,
            email,
            password,
            bio,
            image,
        } = changes;

        if let Some(username) = non_empty(username) {
            self.username = username;
        }
        if let Some(email) = non_empty(email) {
            self.email = email;
        }
        if let Some(bio) = non_empty(bio) {
            self.bio = Some(bio);
        }
        if let Some(image) = non_empty(image) {
            self.image = Some(image);
        }
        self.updated_at = Utc::now();

        non_empty(password)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Candidate account built from a creation request.
#[derive(Clone, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, message = "is required"))]
    pub username: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Validate the candidate before hashing.
    pub fn validate_fields(&self) -> DomainResult<()> {
        validate_account(self, &self.username)
    }
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Account row ready for insertion (password already hashed).
#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Partial update of the current user. `None` and `""` mean "keep".
#[derive(Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

impl std::fmt::Debug for UserChanges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserChanges")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("bio", &self.bio)
            .field("image", &self.image)
            .finish()
    }
}

/// Current-user projection (safe to return to the caller).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub image: Option<String>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
            bio: user.bio,
            image: user.image,
        }
    }
}

/// Another user as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub following: bool,
}

impl Profile {
    pub fn of(user: User, following: bool) -> Self {
        Self {
            username: user.username,
            bio: user.bio,
            image: user.image,
            following,
        }
    }
}
