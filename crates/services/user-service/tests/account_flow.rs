//! End-to-end account flows through the gRPC adapter, backed by the
//! in-memory store and cache.

use std::sync::Arc;

use tonic::metadata::MetadataValue;
use tonic::{Code, Request, Status};

use common::{JwtConfig, ERROR_CODE_METADATA_KEY};
use domain::{HashCost, AUTHORIZATION_METADATA_KEY};
use proto::user::{
    CreateUserRequest, Empty, LoginRequest, ProfileRequest, UpdateUserRequest,
};
use proto::UserService;
use user_service_lib::auth::TokenService;
use user_service_lib::build_grpc_service;
use user_service_lib::config::UserServiceConfig;
use user_service_lib::grpc::UserGrpcService;
use user_service_lib::repository::{CachedUserRepository, InMemoryUserCache, InMemoryUserStore};

const SECRET: &str = "integration-secret-key-at-least-32-bytes";

fn config() -> UserServiceConfig {
    UserServiceConfig {
        jwt: JwtConfig {
            secret: SECRET.to_string(),
            expiration_hours: 3,
        },
        hash_cost: HashCost {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        ..UserServiceConfig::default()
    }
}

fn service() -> UserGrpcService {
    let repo = Arc::new(CachedUserRepository::new(
        Arc::new(InMemoryUserStore::new()),
        Arc::new(InMemoryUserCache::new()),
    ));
    build_grpc_service(repo, &config())
}

fn with_token<T>(token: &str, message: T) -> Request<T> {
    let mut request = Request::new(message);
    request.metadata_mut().insert(
        AUTHORIZATION_METADATA_KEY,
        MetadataValue::try_from(format!("Token {}", token)).unwrap(),
    );
    request
}

fn profile(username: &str) -> ProfileRequest {
    ProfileRequest {
        username: username.to_string(),
    }
}

fn error_kind(status: &Status) -> String {
    status
        .metadata()
        .get(ERROR_CODE_METADATA_KEY)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn register(grpc: &UserGrpcService, username: &str, password: &str) -> String {
    let email = format!("{}@x.com", username);
    grpc.create_user(Request::new(CreateUserRequest {
        username: username.to_string(),
        email: email.clone(),
        password: password.to_string(),
    }))
    .await
    .unwrap();

    grpc.login(Request::new(LoginRequest {
        email,
        password: password.to_string(),
    }))
    .await
    .unwrap()
    .into_inner()
    .token
}

#[tokio::test]
async fn test_create_login_get_update_scenario() {
    let grpc = service();
    let token = register(&grpc, "alice", "pw1").await;

    let me = grpc
        .get_user(with_token(&token, Empty {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(me.username, "alice");
    assert_eq!(me.email, "alice@x.com");

    grpc.update_user(with_token(
        &token,
        UpdateUserRequest {
            username: "alice2".to_string(),
            ..Default::default()
        },
    ))
    .await
    .unwrap();

    let me = grpc
        .get_user(with_token(&token, Empty {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(me.username, "alice2");
    assert_eq!(me.email, "alice@x.com");
}

#[tokio::test]
async fn test_login_token_resolves_to_created_user() {
    let grpc = service();
    let token = register(&grpc, "alice", "pw1").await;

    let tokens = TokenService::new(&config().jwt);
    assert_eq!(tokens.verify(&token).unwrap(), 1);
}

#[tokio::test]
async fn test_login_failures_share_one_error() {
    let grpc = service();
    register(&grpc, "alice", "pw1").await;

    let wrong_password = grpc
        .login(Request::new(LoginRequest {
            email: "alice@x.com".to_string(),
            password: "wrongpw".to_string(),
        }))
        .await
        .unwrap_err();
    let unknown_email = grpc
        .login(Request::new(LoginRequest {
            email: "nobody@x.com".to_string(),
            password: "anything".to_string(),
        }))
        .await
        .unwrap_err();

    assert_eq!(wrong_password.code(), Code::Unauthenticated);
    assert_eq!(wrong_password.code(), unknown_email.code());
    assert_eq!(wrong_password.message(), unknown_email.message());
    assert_eq!(error_kind(&wrong_password), "INVALID_CREDENTIALS");
    assert_eq!(error_kind(&unknown_email), "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_create_user_errors() {
    let grpc = service();
    register(&grpc, "alice", "pw1").await;

    let invalid = grpc
        .create_user(Request::new(CreateUserRequest {
            username: "bad name".to_string(),
            email: "bob@x.com".to_string(),
            password: "pw".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(invalid.code(), Code::InvalidArgument);

    let duplicate = grpc
        .create_user(Request::new(CreateUserRequest {
            username: "alice".to_string(),
            email: "other@x.com".to_string(),
            password: "pw".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(duplicate.code(), Code::AlreadyExists);
}

#[tokio::test]
async fn test_authenticated_calls_reject_bad_tokens() {
    let grpc = service();

    let missing = grpc.get_user(Request::new(Empty {})).await.unwrap_err();
    assert_eq!(missing.code(), Code::Unauthenticated);
    assert_eq!(error_kind(&missing), "MISSING_TOKEN");

    let malformed = grpc
        .get_user(with_token("garbage", Empty {}))
        .await
        .unwrap_err();
    assert_eq!(malformed.code(), Code::Unauthenticated);
    assert_eq!(error_kind(&malformed), "MALFORMED_TOKEN");

    let foreign = TokenService::new(&JwtConfig {
        secret: "some-other-secret-that-is-32-bytes-long".to_string(),
        expiration_hours: 3,
    })
    .issue(1)
    .unwrap();
    let unverifiable = grpc
        .get_profile(with_token(&foreign.token, profile("alice")))
        .await
        .unwrap_err();
    assert_eq!(error_kind(&unverifiable), "UNVERIFIABLE_TOKEN");
}

#[tokio::test]
async fn test_follow_and_unfollow() {
    let grpc = service();
    let alice = register(&grpc, "alice", "pw1").await;
    let bob = register(&grpc, "bob", "pw2").await;

    let before = grpc
        .get_profile(with_token(&alice, profile("bob")))
        .await
        .unwrap()
        .into_inner();
    assert!(!before.following);

    let followed = grpc
        .follow_user(with_token(&alice, profile("bob")))
        .await
        .unwrap()
        .into_inner();
    assert!(followed.following);
    assert_eq!(followed.username, "bob");

    // Edges are directed
    let reverse = grpc
        .get_profile(with_token(&bob, profile("alice")))
        .await
        .unwrap()
        .into_inner();
    assert!(!reverse.following);

    let unfollowed = grpc
        .unfollow_user(with_token(&alice, profile("bob")))
        .await
        .unwrap()
        .into_inner();
    assert!(!unfollowed.following);

    let again = grpc
        .unfollow_user(with_token(&alice, profile("bob")))
        .await
        .unwrap_err();
    assert_eq!(again.code(), Code::FailedPrecondition);
    assert_eq!(error_kind(&again), "NOT_FOLLOWING");
}

#[tokio::test]
async fn test_self_follow_is_rejected() {
    let grpc = service();
    let alice = register(&grpc, "alice", "pw1").await;

    for status in [
        grpc.follow_user(with_token(&alice, profile("alice")))
            .await
            .unwrap_err(),
        grpc.unfollow_user(with_token(&alice, profile("alice")))
            .await
            .unwrap_err(),
    ] {
        assert_eq!(status.code(), Code::PermissionDenied);
        assert_eq!(error_kind(&status), "SELF_REFERENCE");
    }

    let own = grpc
        .get_profile(with_token(&alice, profile("alice")))
        .await
        .unwrap()
        .into_inner();
    assert!(!own.following);
}

#[tokio::test]
async fn test_unknown_profile_is_not_found() {
    let grpc = service();
    let alice = register(&grpc, "alice", "pw1").await;

    let status = grpc
        .follow_user(with_token(&alice, profile("ghost")))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn test_bio_only_update_keeps_credentials() {
    let grpc = service();
    let token = register(&grpc, "alice", "pw1").await;

    let updated = grpc
        .update_user(with_token(
            &token,
            UpdateUserRequest {
                bio: "hello".to_string(),
                ..Default::default()
            },
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(updated.username, "alice");
    assert_eq!(updated.email, "alice@x.com");
    assert_eq!(updated.bio, "hello");

    assert!(grpc
        .login(Request::new(LoginRequest {
            email: "alice@x.com".to_string(),
            password: "pw1".to_string(),
        }))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_renamed_user_can_be_followed_by_new_name() {
    let grpc = service();
    let alice = register(&grpc, "alice", "pw1").await;
    let bob = register(&grpc, "bob", "pw2").await;

    // Warm the cache for bob, then rename
    grpc.get_user(with_token(&bob, Empty {})).await.unwrap();
    grpc.update_user(with_token(
        &bob,
        UpdateUserRequest {
            username: "robert".to_string(),
            ..Default::default()
        },
    ))
    .await
    .unwrap();

    let me = grpc
        .get_user(with_token(&bob, Empty {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(me.username, "robert");

    let followed = grpc
        .follow_user(with_token(&alice, profile("robert")))
        .await
        .unwrap()
        .into_inner();
    assert!(followed.following);
}
