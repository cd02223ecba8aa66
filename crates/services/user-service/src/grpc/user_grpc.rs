//! gRPC implementation for UserService.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::instrument;

use crate::auth::TokenService;
use crate::service::AccountService;
use domain::{NewUser, Profile, UserChanges, UserView};
use proto::user::{
    user_service_server::UserService as UserServiceProto, CreateUserRequest, Empty, LoginRequest,
    LoginResponse, ProfileRequest, ProfileResponse, UpdateUserRequest, UserResponse,
};

/// gRPC service wrapper for AccountService.
///
/// Authenticated RPCs resolve the caller from request metadata before the
/// service is consulted.
pub struct UserGrpcService {
    service: Arc<dyn AccountService>,
    tokens: Arc<TokenService>,
}

impl UserGrpcService {
    pub fn new(service: Arc<dyn AccountService>, tokens: Arc<TokenService>) -> Self {
        Self { service, tokens }
    }

    fn caller<T>(&self, request: &Request<T>) -> Result<i64, Status> {
        self.tokens.resolve_identity(request).map_err(Status::from)
    }
}

#[tonic::async_trait]
impl UserServiceProto for UserGrpcService {
    #[instrument(skip_all)]
    async fn create_user(
        &self,
        request: Request<CreateUserRequest>,
    ) -> Result<Response<UserResponse>, Status> {
        let req = request.into_inner();

        let user = self
            .service
            .create_user(NewUser::new(req.username, req.email, req.password))
            .await
            .map_err(Status::from)?;
        Ok(Response::new(user_to_proto(user)))
    }

    #[instrument(skip_all)]
    async fn login(&self, request: Request<LoginRequest>) -> Result<Response<LoginResponse>, Status> {
        let req = request.into_inner();

        let issued = self
            .service
            .login(req.email, req.password)
            .await
            .map_err(Status::from)?;
        Ok(Response::new(LoginResponse {
            token: issued.token,
            token_type: issued.token_type,
            expires_in: issued.expires_in,
        }))
    }

    #[instrument(skip_all, fields(caller_id))]
    async fn get_user(&self, request: Request<Empty>) -> Result<Response<UserResponse>, Status> {
        let caller_id = self.caller(&request)?;
        tracing::Span::current().record("caller_id", caller_id);

        let user = self
            .service
            .get_current_user(caller_id)
            .await
            .map_err(Status::from)?;
        Ok(Response::new(user_to_proto(user)))
    }

    #[instrument(skip_all, fields(caller_id))]
    async fn update_user(
        &self,
        request: Request<UpdateUserRequest>,
    ) -> Result<Response<UserResponse>, Status> {
        let caller_id = self.caller(&request)?;
        tracing::Span::current().record("caller_id", caller_id);
        let req = request.into_inner();

        let changes = UserChanges {
            username: Some(req.username),
            email: Some(req.email),
            password: Some(req.password),
            bio: Some(req.bio),
            image: Some(req.image),
        };

        let user = self
            .service
            .update_current_user(caller_id, changes)
            .await
            .map_err(Status::from)?;
        Ok(Response::new(user_to_proto(user)))
    }

    #[instrument(skip_all, fields(caller_id))]
    async fn get_profile(
        &self,
        request: Request<ProfileRequest>,
    ) -> Result<Response<ProfileResponse>, Status> {
        let caller_id = self.caller(&request)?;
        tracing::Span::current().record("caller_id", caller_id);
        let req = request.into_inner();

        let profile = self
            .service
            .get_profile(caller_id, req.username)
            .await
            .map_err(Status::from)?;
        Ok(Response::new(profile_to_proto(profile)))
    }

    #[instrument(skip_all, fields(caller_id))]
    async fn follow_user(
        &self,
        request: Request<ProfileRequest>,
    ) -> Result<Response<ProfileResponse>, Status> {
        let caller_id = self.caller(&request)?;
        tracing::Span::current().record("caller_id", caller_id);
        let req = request.into_inner();

        let profile = self
            .service
            .follow_user(caller_id, req.username)
            .await
            .map_err(Status::from)?;
        Ok(Response::new(profile_to_proto(profile)))
    }

    #[instrument(skip_all, fields(caller_id))]
    async fn unfollow_user(
        &self,
        request: Request<ProfileRequest>,
    ) -> Result<Response<ProfileResponse>, Status> {
        let caller_id = self.caller(&request)?;
        tracing::Span::current().record("caller_id", caller_id);
        let req = request.into_inner();

        let profile = self
            .service
            .unfollow_user(caller_id, req.username)
            .await
            .map_err(Status::from)?;
        Ok(Response::new(profile_to_proto(profile)))
    }
}

/// Convert the current-user view to proto UserResponse.
fn user_to_proto(user: UserView) -> UserResponse {
    UserResponse {
        username: user.username,
        email: user.email,
        bio: user.bio.unwrap_or_default(),
        image: user.image.unwrap_or_default(),
    }
}

fn profile_to_proto(profile: Profile) -> ProfileResponse {
    ProfileResponse {
        username: profile.username,
        bio: profile.bio.unwrap_or_default(),
        image: profile.image.unwrap_or_default(),
        following: profile.following,
    }
}
