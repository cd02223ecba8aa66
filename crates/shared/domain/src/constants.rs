//! Domain-level constants.
//!
//! These constants define business rules and validation requirements.

// =============================================================================
// Validation
// =============================================================================

/// Allowed username shape (ASCII letters and digits only)
pub const USERNAME_PATTERN: &str = r"^[a-zA-Z0-9]+$";

// =============================================================================
// Authentication
// =============================================================================

/// Default token validity in hours
pub const DEFAULT_TOKEN_EXPIRATION_HOURS: i64 = 3;

/// Longest configurable token validity (one year)
pub const MAX_TOKEN_EXPIRATION_HOURS: i64 = 24 * 366;

/// Minimum JWT secret length (security requirement)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Seconds per hour (for token expiration calculation)
pub const SECONDS_PER_HOUR: i64 = 3600;

/// Request metadata field carrying the credential
pub const AUTHORIZATION_METADATA_KEY: &str = "authorization";

/// Accepted credential schemes in the authorization field
pub const ACCEPTED_TOKEN_SCHEMES: &[&str] = &["Token", "Bearer"];

/// JWT token type identifier
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

// =============================================================================
// Caching
// =============================================================================

/// Lifetime of a cached user snapshot (1 hour)
pub const USER_CACHE_TTL_SECONDS: u64 = 3600;
