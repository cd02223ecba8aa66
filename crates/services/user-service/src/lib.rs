//! User Service Library
//!
//! Account creation, token authentication, profile management and the
//! follow graph, served over gRPC. Backed by Postgres with a Redis
//! read-through cache, or entirely in memory with `--ephemeral`.

pub mod auth;
pub mod config;
pub mod grpc;
pub mod infra;
pub mod repository;
pub mod service;

use std::sync::Arc;

use tonic::transport::Server;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::TokenService;
use crate::config::UserServiceConfig;
use crate::grpc::UserGrpcService;
use crate::infra::Database;
use crate::repository::{
    CachedUserRepository, DbUserStore, InMemoryUserCache, InMemoryUserStore, NoopUserCache,
    RedisUserCache, UserCache, UserRepository,
};
use crate::service::AccountManager;

/// Run the user service against Postgres and Redis.
///
/// `host` and `port` override `USER_SERVICE_HOST`/`USER_SERVICE_PORT`.
pub async fn run_embedded(
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = UserServiceConfig::from_env()?.with_listen_overrides(host, port);
    run_server_with_config(config).await
}

/// Run the user service with in-memory storage (nothing survives a restart).
pub async fn run_ephemeral(
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = UserServiceConfig::from_env()?.with_listen_overrides(host, port);
    warn!("Running with in-memory storage; data is lost on shutdown");

    let repo = Arc::new(CachedUserRepository::new(
        Arc::new(InMemoryUserStore::new()),
        Arc::new(InMemoryUserCache::new()),
    ));

    serve(&config, build_grpc_service(repo, &config)).await
}

/// Run migrations (for CLI commands).
pub async fn run_migrations(action: MigrateAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = UserServiceConfig::from_env()?;
    let db = Database::connect_without_migrations(&config.database).await?;

    match action {
        MigrateAction::Up => {
            db.run_migrations().await?;
            info!("Migrations applied successfully");
        }
        MigrateAction::Down => {
            db.rollback_migration().await?;
            info!("Rolled back last migration");
        }
        MigrateAction::Status => {
            let status = db.migration_status().await?;
            for (name, applied) in status {
                let marker = if applied { "[x]" } else { "[ ]" };
                println!("{} {}", marker, name);
            }
        }
        MigrateAction::Fresh => {
            db.fresh_migrations().await?;
            info!("Database reset and migrations applied");
        }
    }

    Ok(())
}

/// Migration action type.
#[derive(Debug, Clone, Copy)]
pub enum MigrateAction {
    Up,
    Down,
    Status,
    Fresh,
}

/// Wire the token service and account manager around a repository.
pub fn build_grpc_service(
    repo: Arc<dyn UserRepository>,
    config: &UserServiceConfig,
) -> UserGrpcService {
    let tokens = Arc::new(TokenService::new(&config.jwt));
    let accounts = Arc::new(AccountManager::new(
        repo,
        tokens.clone(),
        config.hash_cost,
    ));

    UserGrpcService::new(accounts, tokens)
}

/// Connect the cache, or fall back to a no-op cache when it is disabled or
/// unreachable. Reads then go straight to the store.
async fn connect_cache(config: &UserServiceConfig) -> Arc<dyn UserCache> {
    if !config.cache.enabled {
        info!("User cache disabled");
        return Arc::new(NoopUserCache);
    }

    match RedisUserCache::connect(&config.cache).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!(error = %e, "Redis unavailable, continuing without user cache");
            Arc::new(NoopUserCache)
        }
    }
}

/// Run the gRPC server with the given configuration.
async fn run_server_with_config(
    config: UserServiceConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize database
    let db = Database::connect(&config.database).await?;
    db.ping().await?;

    let store = Arc::new(DbUserStore::new(db.get_connection()));
    let cache = connect_cache(&config).await;
    let repo = Arc::new(CachedUserRepository::new(store, cache));

    serve(&config, build_grpc_service(repo, &config)).await
}

async fn serve(
    config: &UserServiceConfig,
    grpc_service: UserGrpcService,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.service.socket_addr()?;
    info!(service = %config.service.service_name, "listening on {}", addr);

    let layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_grpc())
        .into_inner();

    Server::builder()
        .layer(layers)
        .add_service(proto::UserServiceServer::new(grpc_service))
        .serve_with_shutdown(addr, shutdown_signal())
        .await?;

    info!(service = %config.service.service_name, "stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
