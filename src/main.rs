use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpServer,
};
use actix_web_httpauth::middleware::HttpAuthentication;
use anyhow::Context;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqlitePool,
};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Module declarations
mod auth;
mod auth_handlers;
mod balance;
mod balance_handlers;
mod config;
mod db;
mod error;
mod export;
mod handlers;
mod keys;
mod models;
mod pagination;
mod solution_handlers;
mod store;

use auth::{jwt_middleware, AuthService, CreateUserRequest, User, UserRole};
use config::{load_config, Config};

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
}

// ==================== MAIN ====================

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    setup_logging(&config)?;

    if config.is_production() {
        validate_production_config(&config)?;
    }

    setup_database(&config.database.url).await?;
    let pool = create_database_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    // Signing secret: configured, or loaded/generated from the key store.
    let jwt_secret = keys::ensure_jwt_secret(&pool, &config.auth.jwt_secret).await?;
    let auth_service = Arc::new(AuthService::new(&jwt_secret, &config.auth));

    seed_default_users(&pool, &auth_service, config.is_production()).await?;

    config.print_startup_info();

    let app_state = Arc::new(AppState {
        db_pool: pool.clone(),
        config: config.clone(),
    });

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server at http://{}", bind_address);

    let workers = config.server.workers;
    let server_config = config.clone();

    let mut server = HttpServer::new(move || {
        let cors = setup_cors(
            &server_config.security.allowed_origins,
            server_config.is_production(),
        );
        let security_headers = setup_security_headers(&server_config.security);

        App::new()
            .wrap(cors)
            .wrap(security_headers)
            .wrap(Logger::default())
            .wrap(Compress::default())
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            // Liveness and login are the only unauthenticated endpoints.
            .route("/healthz", web::get().to(handlers::healthz))
            .route("/auth/login", web::post().to(auth_handlers::login))
            .service(
                web::scope("/auth")
                    .wrap(HttpAuthentication::bearer(jwt_middleware))
                    .route("/profile", web::get().to(auth_handlers::get_profile))
                    .route("/change-password", web::post().to(auth_handlers::change_password))
                    .route("/logout", web::post().to(auth_handlers::logout))
                    .route("/users", web::post().to(auth_handlers::create_user))
                    .route("/users/{id}", web::delete().to(auth_handlers::delete_user))
                    .route(
                        "/users/{id}/reset-password",
                        web::put().to(auth_handlers::reset_user_password),
                    ),
            )
            .service(
                web::scope("/records")
                    .wrap(HttpAuthentication::bearer(jwt_middleware))
                    // Registered ahead of /{id} so the literal path wins.
                    .route("/export.pdf", web::get().to(solution_handlers::export_solutions_pdf))
                    .route("", web::get().to(solution_handlers::list_solutions))
                    .route("", web::post().to(solution_handlers::create_solution))
                    .route("/{id}", web::get().to(solution_handlers::get_solution))
                    .route("/{id}", web::post().to(solution_handlers::update_solution))
                    .route("/{id}/delete", web::post().to(solution_handlers::delete_solution)),
            )
            .service(
                web::scope("/balance")
                    .wrap(HttpAuthentication::bearer(jwt_middleware))
                    .route("", web::get().to(balance_handlers::get_balance))
                    .route("/export.csv", web::get().to(balance_handlers::export_balance_csv)),
            )
    })
    .bind(&bind_address)?;

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server.run().await.context("Server failed to run")?;

    Ok(())
}

// ==================== HELPER FUNCTIONS ====================

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn validate_production_config(config: &Config) -> anyhow::Result<()> {
    if config.security.allowed_origins.contains(&"*".to_string()) {
        anyhow::bail!("Wildcard CORS origins not allowed in production!");
    }

    if !config.security.require_https {
        log::warn!("HTTPS not required in production mode");
    }

    Ok(())
}

async fn setup_database(database_url: &str) -> anyhow::Result<()> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        log::info!("Creating database: {}", database_url);
        Sqlite::create_database(database_url).await?;
    }
    Ok(())
}

async fn create_database_pool(db_config: &config::DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&db_config.url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.connect_timeout))
        .connect_with(options)
        .await?;

    Ok(pool)
}

fn setup_cors(allowed_origins: &[String], is_production: bool) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .max_age(3600);

    if allowed_origins.contains(&"*".to_string()) && !is_production {
        log::warn!("Using wildcard CORS (*) in development mode");
        cors = cors.allow_any_origin().allow_any_header().allow_any_method();
    } else {
        for origin in allowed_origins {
            if !origin.is_empty() {
                cors = cors.allowed_origin(origin);
            }
        }
    }

    cors
}

fn setup_security_headers(config: &config::SecurityConfig) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"));

    if config.require_https {
        headers = headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains; preload",
        ));
    }

    headers
}

/// Seeds the two fixed accounts the lab works with. Production requires the
/// passwords in the environment; development generates and logs them.
async fn seed_default_users(
    pool: &SqlitePool,
    auth_service: &AuthService,
    is_production: bool,
) -> anyhow::Result<()> {
    let seeds = [
        ("admin", UserRole::Admin, "SEED_ADMIN_PASSWORD", "admin@preplab.local"),
        ("labo", UserRole::Labo, "SEED_LABO_PASSWORD", "labo@preplab.local"),
    ];

    for (username, role, password_var, email) in seeds {
        if User::find_by_username(pool, username).await.is_ok() {
            continue;
        }

        let password = match env::var(password_var) {
            Ok(password) if !password.trim().is_empty() => password,
            _ if is_production => {
                anyhow::bail!("{} must be set in production to seed user '{}'", password_var, username)
            }
            _ => {
                let generated = generate_password();
                log::warn!(
                    "Generated password for seeded user '{}': {} (change it immediately)",
                    username,
                    generated
                );
                generated
            }
        };

        let request = CreateUserRequest {
            username: username.to_string(),
            email: email.to_string(),
            password,
            role: None,
        };

        User::create(pool, request, role.clone(), auth_service)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to seed user '{}': {}", username, e))?;

        log::info!("Seeded user '{}' with role {}", username, role);
    }

    Ok(())
}

fn generate_password() -> String {
    let mut rng = thread_rng();
    loop {
        let candidate: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();

        let has_upper = candidate.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = candidate.chars().any(|c| c.is_ascii_lowercase());
        let has_digit = candidate.chars().any(|c| c.is_ascii_digit());

        if has_upper && has_lower && has_digit {
            return candidate;
        }
    }
}
