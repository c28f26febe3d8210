// src/config.rs - Configuration management
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Empty means "load or generate a persisted secret at startup".
    pub jwt_secret: String,
    pub token_expiration_hours: i64,
    pub bcrypt_cost: u32,
    pub max_login_attempts: u32,
    pub lockout_duration_minutes: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub require_https: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:preplab.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_expiration_hours: 24,
            bcrypt_cost: 12,
            max_login_attempts: 5,
            lockout_duration_minutes: 15,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:8080".to_string(),
            ],
            require_https: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config() -> Result<Config> {
    load_env_file()?;

    let mut config = if let Ok(config_file) = env::var("CONFIG_FILE") {
        let config_str = fs::read_to_string(&config_file)
            .with_context(|| format!("Failed to read config file: {}", config_file))?;
        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_file))?
    } else {
        Config::default()
    };

    override_with_env(&mut config);

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

fn override_with_env(config: &mut Config) {
    if let Ok(host) = env::var("BIND_ADDRESS") {
        config.server.host = host;
    }
    if let Ok(Ok(port)) = env::var("PREPLAB_PORT").map(|s| s.parse::<u16>()) {
        config.server.port = port;
    }
    if let Ok(Ok(workers)) = env::var("PREPLAB_WORKERS").map(|s| s.parse::<usize>()) {
        config.server.workers = Some(workers);
    }
    if let Ok(url) = env::var("DATABASE_URL") {
        config.database.url = url;
    }
    if let Ok(Ok(max_conn)) = env::var("DATABASE_MAX_CONNECTIONS").map(|s| s.parse::<u32>()) {
        config.database.max_connections = max_conn;
    }
    if let Ok(Ok(min_conn)) = env::var("DATABASE_MIN_CONNECTIONS").map(|s| s.parse::<u32>()) {
        config.database.min_connections = min_conn;
    }
    if let Ok(jwt_secret) = env::var("JWT_SECRET") {
        config.auth.jwt_secret = jwt_secret;
    }
    if let Ok(Ok(expiration)) = env::var("AUTH_TOKEN_EXPIRATION_HOURS").map(|s| s.parse::<i64>()) {
        config.auth.token_expiration_hours = expiration;
    }
    if let Ok(Ok(cost)) = env::var("AUTH_BCRYPT_COST").map(|s| s.parse::<u32>()) {
        config.auth.bcrypt_cost = cost;
    }
    if let Ok(Ok(max)) = env::var("AUTH_MAX_LOGIN_ATTEMPTS").map(|s| s.parse::<u32>()) {
        config.auth.max_login_attempts = max;
    }
    if let Ok(Ok(lockout)) = env::var("AUTH_LOCKOUT_DURATION_MINUTES").map(|s| s.parse::<u64>()) {
        config.auth.lockout_duration_minutes = lockout;
    }
    if let Ok(origins) = env::var("ALLOWED_ORIGINS") {
        config.security.allowed_origins = origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(level) = env::var("RUST_LOG") {
        config.logging.level = level;
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        // An empty secret is allowed here: it is resolved against the
        // persisted key store during startup.
        if !self.auth.jwt_secret.is_empty() && self.auth.jwt_secret.len() < 32 {
            anyhow::bail!(
                "JWT_SECRET must be at least 32 characters long (current: {})",
                self.auth.jwt_secret.len()
            );
        }

        if self.database.max_connections < self.database.min_connections {
            anyhow::bail!(
                "max_connections ({}) must be >= min_connections ({})",
                self.database.max_connections,
                self.database.min_connections
            );
        }

        if self.auth.max_login_attempts == 0 {
            anyhow::bail!("max_login_attempts must be at least 1");
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        env::var("PREPLAB_ENV").map(|v| v == "production").unwrap_or(false)
    }

    pub fn print_startup_info(&self) {
        log::info!("Prepared-solutions registry starting up");
        log::info!("Server: {}:{}", self.server.host, self.server.port);
        log::info!(
            "Database: {}",
            if self.database.url.contains("sqlite") {
                "SQLite"
            } else if self.database.url.contains("postgres") {
                "PostgreSQL"
            } else {
                "Unknown"
            }
        );
        log::info!("Auth: JWT ({}h expiration)", self.auth.token_expiration_hours);
        log::info!("Logging: {} level", self.logging.level);

        if !self.is_production() {
            log::warn!("Running in development mode");
        }
    }
}

pub fn load_env_file() -> Result<()> {
    if let Ok(env_file) = env::var("ENV_FILE") {
        dotenvy::from_filename(&env_file)
            .with_context(|| format!("Failed to load environment file: {}", env_file))?;
    } else if Path::new(".env").exists() {
        dotenvy::dotenv().context("Failed to load .env file")?;
    }
    Ok(())
}
