//! Unified error handling for the gRPC surface.
//!
//! Provides a single error type with a stable kind (`code`), a caller-safe
//! message and a conversion to Tonic gRPC status codes.

use domain::DomainError;
use thiserror::Error;
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::Status;

/// Metadata field carrying the stable error kind on every failed response.
pub const ERROR_CODE_METADATA_KEY: &str = "x-error-code";

/// Reasons a bearer token could not be resolved to an identity.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("Authentication token is missing")]
    Missing,

    #[error("Authentication token is malformed")]
    Malformed,

    #[error("Authentication token has expired")]
    Expired,

    #[error("Authentication token could not be verified")]
    Unverifiable,
}

impl TokenError {
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Missing => "MISSING_TOKEN",
            TokenError::Malformed => "MALFORMED_TOKEN",
            TokenError::Expired => "EXPIRED_TOKEN",
            TokenError::Unverifiable => "UNVERIFIABLE_TOKEN",
        }
    }
}

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication & Authorization
    #[error("{0}")]
    Token(#[from] TokenError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Cannot follow or unfollow yourself")]
    SelfReference,

    // Resource errors
    #[error("Resource not found")]
    NotFound,

    #[error("You are not following this user")]
    NotFollowing,

    #[error("{0} already exists")]
    Conflict(String),

    // Validation
    #[error("{0}")]
    Validation(String),

    // Write path
    #[error("{0}")]
    Aborted(String),

    #[error("Service temporarily unavailable")]
    Transient(String),

    // External service errors
    #[cfg(feature = "database")]
    #[error("Database error")]
    Database(sea_orm::DbErr),

    #[cfg(feature = "jwt")]
    #[error("Token signing error")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    // Internal
    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// Get error code for client
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Token(kind) => kind.code(),
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::SelfReference => "SELF_REFERENCE",
            AppError::NotFound => "NOT_FOUND",
            AppError::NotFollowing => "NOT_FOLLOWING",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Aborted(_) => "ABORTED",
            AppError::Transient(_) => "UNAVAILABLE",
            #[cfg(feature = "database")]
            AppError::Database(_) => "DATABASE_ERROR",
            #[cfg(feature = "jwt")]
            AppError::Jwt(_) => "TOKEN_SIGNING_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get gRPC status code
    pub fn grpc_code(&self) -> tonic::Code {
        match self {
            AppError::Token(_) | AppError::InvalidCredentials => tonic::Code::Unauthenticated,
            AppError::SelfReference => tonic::Code::PermissionDenied,
            AppError::NotFound => tonic::Code::NotFound,
            AppError::NotFollowing => tonic::Code::FailedPrecondition,
            AppError::Conflict(_) => tonic::Code::AlreadyExists,
            AppError::Validation(_) => tonic::Code::InvalidArgument,
            AppError::Aborted(_) => tonic::Code::Aborted,
            AppError::Transient(_) => tonic::Code::Unavailable,
            _ => tonic::Code::Internal,
        }
    }

    /// Get user-facing message (hides internal details)
    pub fn user_message(&self) -> String {
        match self {
            // Show full message for client errors
            AppError::Validation(msg) => format!("validation error: {}", msg),
            AppError::Aborted(msg) => msg.clone(),

            // Hide details for internal/security errors
            AppError::Transient(detail) => {
                tracing::error!("Transient backend failure: {}", detail);
                self.to_string()
            }
            #[cfg(feature = "database")]
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "A database error occurred".to_string()
            }
            #[cfg(feature = "jwt")]
            AppError::Jwt(e) => {
                tracing::error!("JWT error: {:?}", e);
                "Failed to create token".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }

            // Use default message for others
            _ => self.to_string(),
        }
    }

    /// Reclassify an unexpected failure of a write as `Aborted`.
    ///
    /// Conflicts, missing rows and transient failures keep their kind.
    pub fn into_write_failure(self, action: &str) -> AppError {
        match self {
            #[cfg(feature = "database")]
            AppError::Database(e) => {
                tracing::error!("Failed to {}: {:?}", action, e);
                AppError::Aborted(format!("failed to {}", action))
            }
            AppError::Internal(msg) => {
                tracing::error!("Failed to {}: {}", action, msg);
                AppError::Aborted(format!("failed to {}", action))
            }
            other => other,
        }
    }
}

// =============================================================================
// gRPC Status (Tonic)
// =============================================================================

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        let mut metadata = MetadataMap::new();
        metadata.insert(ERROR_CODE_METADATA_KEY, MetadataValue::from_static(err.code()));

        Status::with_metadata(err.grpc_code(), err.user_message(), metadata)
    }
}

// =============================================================================
// Domain Error Conversion
// =============================================================================

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::EmptyPassword => {
                AppError::Validation(DomainError::EmptyPassword.to_string())
            }
            DomainError::Hashing(msg) => {
                tracing::error!("Password hashing failed: {}", msg);
                AppError::Aborted("failed to hash password".to_string())
            }
        }
    }
}

// =============================================================================
// Database Error Conversion
// =============================================================================

#[cfg(feature = "database")]
impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        use sea_orm::{DbErr, SqlErr};

        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return AppError::Conflict(conflicting_field(&detail).to_string());
        }

        match err {
            DbErr::RecordNotFound(_) | DbErr::RecordNotUpdated => AppError::NotFound,
            DbErr::ConnectionAcquire(e) => AppError::Transient(e.to_string()),
            DbErr::Conn(e) => AppError::Transient(e.to_string()),
            other => AppError::Database(other),
        }
    }
}

/// Name the unique column a constraint violation refers to.
pub fn conflicting_field(detail: &str) -> &'static str {
    let detail = detail.to_ascii_lowercase();
    if detail.contains("username") {
        "Username"
    } else if detail.contains("email") {
        "Email"
    } else {
        "Record"
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Extension trait for Option -> AppError conversion
pub trait OptionExt<T> {
    fn ok_or_not_found(self) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self) -> AppResult<T> {
        self.ok_or(AppError::NotFound)
    }
}

/// Convenience constructors
impl AppError {
    pub fn conflict(entity: impl Into<String>) -> Self {
        AppError::Conflict(entity.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
