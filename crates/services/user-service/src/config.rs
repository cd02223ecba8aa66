//! User service configuration.

use std::env;

use common::{AppResult, CacheConfig, DatabaseConfig, JwtConfig, ServiceConfig};
use domain::HashCost;

/// User service configuration, loaded once at process start.
#[derive(Debug, Clone)]
pub struct UserServiceConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub jwt: JwtConfig,
    /// Argon2 work factor for new password hashes
    pub hash_cost: HashCost,
}

impl UserServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns a validation error when `JWT_SECRET` is missing or too short.
    pub fn from_env() -> AppResult<Self> {
        let service_defaults = ServiceConfig::default();
        let database_defaults = DatabaseConfig::default();
        let cache_defaults = CacheConfig::default();
        let hash_defaults = HashCost::default();

        let service = ServiceConfig {
            service_name: env::var("USER_SERVICE_NAME")
                .unwrap_or_else(|_| "user-service".to_string()),
            host: env::var("USER_SERVICE_HOST").unwrap_or(service_defaults.host),
            port: parse_var("USER_SERVICE_PORT").unwrap_or(service_defaults.port),
        };

        let database = DatabaseConfig {
            url: env::var("USER_SERVICE_DATABASE_URL")
                .or_else(|_| env::var("DATABASE_URL"))
                .ok()
                .or_else(database_url_from_parts)
                .unwrap_or(database_defaults.url),
            max_connections: parse_var("DB_MAX_CONNECTIONS")
                .unwrap_or(database_defaults.max_connections),
            min_connections: parse_var("DB_MIN_CONNECTIONS")
                .unwrap_or(database_defaults.min_connections),
            connect_timeout_seconds: parse_var("DB_CONNECT_TIMEOUT_SECONDS")
                .unwrap_or(database_defaults.connect_timeout_seconds),
        };

        let cache = CacheConfig {
            enabled: parse_var("CACHE_ENABLED").unwrap_or(cache_defaults.enabled),
            url: env::var("USER_SERVICE_REDIS_URL")
                .or_else(|_| env::var("REDIS_URL"))
                .unwrap_or(cache_defaults.url),
            key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or(cache_defaults.key_prefix),
            operation_timeout_ms: parse_var("CACHE_TIMEOUT_MS")
                .unwrap_or(cache_defaults.operation_timeout_ms),
        };

        let jwt = JwtConfig {
            secret: env::var("JWT_SECRET").unwrap_or_default(),
            expiration_hours: parse_var("JWT_EXPIRATION_HOURS")
                .unwrap_or(JwtConfig::default().expiration_hours),
        };
        jwt.validate()?;

        let hash_cost = HashCost {
            memory_kib: parse_var("PASSWORD_HASH_MEMORY_KIB").unwrap_or(hash_defaults.memory_kib),
            iterations: parse_var("PASSWORD_HASH_ITERATIONS").unwrap_or(hash_defaults.iterations),
            parallelism: parse_var("PASSWORD_HASH_PARALLELISM")
                .unwrap_or(hash_defaults.parallelism),
        };

        Ok(Self {
            service,
            database,
            cache,
            jwt,
            hash_cost,
        })
    }

    /// Apply command-line bind overrides on top of the environment.
    pub fn with_listen_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.service.host = host;
        }
        if let Some(port) = port {
            self.service.port = port;
        }
        self
    }
}

impl Default for UserServiceConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                service_name: "user-service".to_string(),
                ..ServiceConfig::default()
            },
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            jwt: JwtConfig::default(),
            hash_cost: HashCost::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Assemble a URL from `DB_HOST`/`DB_PORT`/`DB_USER`/`DB_PASSWORD`/`DB_NAME`
/// when a host is given.
fn database_url_from_parts() -> Option<String> {
    let host = env::var("DB_HOST").ok()?;
    let port = parse_var("DB_PORT").unwrap_or(5432);
    let user = env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = env::var("DB_PASSWORD").unwrap_or_default();
    let name = env::var("DB_NAME").unwrap_or_else(|_| "user_db".to_string());

    Some(DatabaseConfig::postgres_url(&host, port, &user, &password, &name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_overrides_replace_only_given_fields() {
        let config = UserServiceConfig::default().with_listen_overrides(None, Some(6000));
        assert_eq!(config.service.host, "0.0.0.0");
        assert_eq!(config.service.port, 6000);

        let config = config.with_listen_overrides(Some("127.0.0.1".to_string()), None);
        assert_eq!(config.service.host, "127.0.0.1");
        assert_eq!(config.service.port, 6000);
    }

    #[test]
    fn test_default_service_identity() {
        let config = UserServiceConfig::default();
        assert_eq!(config.service.service_name, "user-service");
        assert_eq!(config.service.port, 50052);
    }
}
