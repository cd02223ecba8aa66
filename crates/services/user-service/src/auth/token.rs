//! Token service - issues and verifies signed, time-bounded bearer tokens.
//!
//! Tokens are HS256 JWTs carrying the user id plus `iat`/`exp`. Nothing is
//! persisted; a token is only reconstructible by verification with the
//! secret handed to [`TokenService::new`].

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use tonic::metadata::MetadataMap;
use tonic::Request;

use common::{AppError, AppResult, JwtConfig, TokenError};
use domain::{
    ACCEPTED_TOKEN_SCHEMES, AUTHORIZATION_METADATA_KEY, SECONDS_PER_HOUR, TOKEN_TYPE_BEARER,
};

/// JWT claims payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub exp: i64,
    pub iat: i64,
}

/// Token returned after a successful login
#[derive(Clone)]
pub struct IssuedToken {
    /// Signed JWT
    pub token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Validity in seconds
    pub expires_in: i64,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Issues tokens at login and resolves caller identity on every request.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiration_hours: i64,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret_bytes()),
            validation,
            expiration_hours: config.expiration_hours,
        }
    }

    /// Sign a token for `user_id`, valid from now.
    pub fn issue(&self, user_id: i64) -> AppResult<IssuedToken> {
        self.issue_at(user_id, Utc::now())
    }

    /// Sign a token for `user_id` as if issued at `now`.
    pub fn issue_at(&self, user_id: i64, now: DateTime<Utc>) -> AppResult<IssuedToken> {
        let expires_at = Duration::try_hours(self.expiration_hours)
            .and_then(|validity| now.checked_add_signed(validity))
            .ok_or_else(|| AppError::internal("token lifetime out of range"))?;
        let expires_in = self
            .expiration_hours
            .checked_mul(SECONDS_PER_HOUR)
            .ok_or_else(|| AppError::internal("token lifetime out of range"))?;

        let claims = Claims {
            user_id,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(IssuedToken {
            token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in,
        })
    }

    /// Verify a raw token and return the user id it was issued for.
    pub fn verify(&self, token: &str) -> AppResult<i64> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a raw token against the clock reading `now`.
    ///
    /// The decoder checks `exp` against the system clock; the claim is then
    /// compared with `now` as well, so both must agree the token is live.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> AppResult<i64> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            let kind = classify(e.kind());
            tracing::debug!(reason = kind.code(), "token rejected");
            kind
        })?;

        if data.claims.exp < now.timestamp() {
            tracing::debug!(reason = TokenError::Expired.code(), "token rejected");
            return Err(TokenError::Expired.into());
        }

        Ok(data.claims.user_id)
    }

    /// Extract the credential from request metadata and resolve it.
    pub fn resolve_identity<T>(&self, request: &Request<T>) -> AppResult<i64> {
        let token = credential_from_metadata(request.metadata())?;
        self.verify(token)
    }
}

/// Read `authorization: <scheme> <token>` from metadata.
pub fn credential_from_metadata(metadata: &MetadataMap) -> Result<&str, TokenError> {
    let value = metadata
        .get(AUTHORIZATION_METADATA_KEY)
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::Malformed)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(TokenError::Malformed)?;

    if !ACCEPTED_TOKEN_SCHEMES
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(scheme))
    {
        return Err(TokenError::Malformed);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Malformed);
    }

    Ok(token)
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
            TokenError::Malformed
        }
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => TokenError::Expired,
        _ => TokenError::Unverifiable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::MetadataValue;

    const SECRET: &str = "test-secret-key-for-testing-only-32chars";

    fn service() -> TokenService {
        TokenService::new(&JwtConfig {
            secret: SECRET.to_string(),
            expiration_hours: 3,
        })
    }

    fn token_error(result: AppResult<i64>) -> TokenError {
        match result {
            Err(AppError::Token(kind)) => kind,
            other => panic!("expected token error, got {:?}", other),
        }
    }

    #[test]
    fn test_issue_then_verify_round_trip() {
        let tokens = service();
        let issued = tokens.issue(42).unwrap();

        assert_eq!(issued.token_type, "Bearer");
        assert_eq!(issued.expires_in, 3 * 3600);
        assert_eq!(tokens.verify(&issued.token).unwrap(), 42);
    }

    #[test]
    fn test_expired_one_second_after_validity() {
        let tokens = service();
        let t0 = Utc::now();
        let issued = tokens.issue_at(7, t0).unwrap();

        let just_before = t0 + Duration::hours(3);
        assert_eq!(tokens.verify_at(&issued.token, just_before).unwrap(), 7);

        let after = t0 + Duration::hours(3) + Duration::seconds(1);
        assert_eq!(
            token_error(tokens.verify_at(&issued.token, after)),
            TokenError::Expired
        );
    }

    #[test]
    fn test_expired_by_embedded_claim() {
        let tokens = service();
        let t0 = Utc::now() - Duration::hours(3) - Duration::seconds(1);
        let issued = tokens.issue_at(7, t0).unwrap();

        assert_eq!(token_error(tokens.verify(&issued.token)), TokenError::Expired);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let tokens = service();
        assert_eq!(
            token_error(tokens.verify("not-a-token")),
            TokenError::Malformed
        );
        assert_eq!(token_error(tokens.verify("")), TokenError::Malformed);
    }

    #[test]
    fn test_foreign_signature_is_unverifiable() {
        let other = TokenService::new(&JwtConfig {
            secret: "another-secret-key-for-testing-32chars!!".to_string(),
            expiration_hours: 3,
        });
        let issued = other.issue(1).unwrap();

        assert_eq!(
            token_error(service().verify(&issued.token)),
            TokenError::Unverifiable
        );
    }

    #[test]
    fn test_unknown_claims_shape_is_unverifiable() {
        #[derive(Serialize)]
        struct OtherClaims {
            sub: String,
            exp: i64,
        }

        let token = encode(
            &Header::new(Algorithm::HS256),
            &OtherClaims {
                sub: "alice".to_string(),
                exp: Utc::now().timestamp() + 600,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(
            token_error(service().verify(&token)),
            TokenError::Unverifiable
        );
    }

    #[test]
    fn test_resolve_identity_from_metadata() {
        let tokens = service();
        let issued = tokens.issue(9).unwrap();

        for scheme in ["Token", "Bearer", "token"] {
            let mut request = Request::new(());
            request.metadata_mut().insert(
                AUTHORIZATION_METADATA_KEY,
                MetadataValue::try_from(format!("{} {}", scheme, issued.token)).unwrap(),
            );
            assert_eq!(tokens.resolve_identity(&request).unwrap(), 9);
        }
    }

    #[test]
    fn test_missing_metadata() {
        let request = Request::new(());
        assert_eq!(
            token_error(service().resolve_identity(&request)),
            TokenError::Missing
        );
    }

    #[test]
    fn test_wrong_scheme_is_malformed() {
        let mut metadata = MetadataMap::new();
        metadata.insert(AUTHORIZATION_METADATA_KEY, MetadataValue::from_static("Basic abc"));
        assert_eq!(
            credential_from_metadata(&metadata),
            Err(TokenError::Malformed)
        );

        let mut metadata = MetadataMap::new();
        metadata.insert(AUTHORIZATION_METADATA_KEY, MetadataValue::from_static("Token"));
        assert_eq!(
            credential_from_metadata(&metadata),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_unrepresentable_lifetime_is_internal_error() {
        let tokens = TokenService::new(&JwtConfig {
            secret: SECRET.to_string(),
            expiration_hours: i64::MAX / 1000,
        });

        assert!(matches!(tokens.issue(1), Err(AppError::Internal(_))));
    }

    #[test]
    fn test_issued_token_debug_hides_token() {
        let issued = service().issue(1).unwrap();
        assert!(!format!("{:?}", issued).contains(&issued.token));
    }
}
