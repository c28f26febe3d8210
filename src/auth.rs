use actix_web::{dev::ServiceRequest, web, HttpMessage, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;
use validator::Validate;

use crate::config::AuthConfig;
use crate::error::{ApiError, ApiResult};

// ======== USER MODEL ========

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub two_factor_enabled: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

// ======== USER ROLE ========

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum UserRole {
    Admin,
    Labo,
}

impl UserRole {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "labo" => Some(UserRole::Labo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Labo => "labo",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ======== AUTHORIZATION ========

/// Operations gated by role. Write handlers call `can_perform` explicitly
/// at their top, independent of the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewRecords,
    CreateRecord,
    EditRecord,
    DeleteRecord,
    ExportReports,
    ManageUsers,
}

pub fn can_perform(role: &UserRole, action: Action) -> bool {
    match action {
        Action::DeleteRecord | Action::ManageUsers => matches!(role, UserRole::Admin),
        Action::ViewRecords
        | Action::CreateRecord
        | Action::EditRecord
        | Action::ExportReports => matches!(role, UserRole::Admin | UserRole::Labo),
    }
}

// ======== REQUEST/RESPONSE STRUCTS ========

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            role: user.get_role(),
            id: user.id,
            username: user.username,
            email: user.email,
            is_active: user.is_active,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

// ======== AUTH SERVICE ========

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiration: Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(jwt_secret: &str, config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_expiration: Duration::hours(config.token_expiration_hours),
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    pub fn token_expiration_seconds(&self) -> i64 {
        self.token_expiration.num_seconds()
    }

    pub fn hash_password(&self, password: &str) -> ApiResult<String> {
        validate_password_strength(password)?;
        hash(password, self.bcrypt_cost)
            .map_err(|_| ApiError::InternalServerError("Failed to hash password".to_string()))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> ApiResult<bool> {
        verify(password, hash)
            .map_err(|_| ApiError::InternalServerError("Password verification failed".to_string()))
    }

    pub fn generate_token(&self, user: &User) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + self.token_expiration;

        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.get_role(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| ApiError::AuthError("Failed to generate token".to_string()))
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::AuthError("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    ApiError::AuthError("Invalid token".to_string())
                }
                _ => ApiError::AuthError("Token verification failed".to_string()),
            })
    }
}

// ======== PASSWORD VALIDATION ========

fn validate_password_strength(password: &str) -> ApiResult<()> {
    if password.len() < 8 {
        return Err(ApiError::ValidationError(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one digit".to_string(),
        ));
    }
    Ok(())
}

// ======== AUTHENTICATION OUTCOME ========

/// Outcome of a username/password check, lockout included. The handler
/// maps this onto HTTP; nothing here touches the transport.
#[derive(Debug)]
pub enum AuthDecision {
    Success(Box<User>),
    InvalidCredentials,
    LockedOut,
    RequiresTwoFactor,
}

pub async fn authenticate(
    pool: &SqlitePool,
    auth_service: &AuthService,
    config: &AuthConfig,
    username: &str,
    password: &str,
) -> ApiResult<AuthDecision> {
    let mut user = match User::find_by_username(pool, username).await {
        Ok(user) => user,
        Err(ApiError::NotFound(_)) => return Ok(AuthDecision::InvalidCredentials),
        Err(err) => return Err(err),
    };

    if !user.is_active {
        return Ok(AuthDecision::InvalidCredentials);
    }

    if user.is_locked() {
        return Ok(AuthDecision::LockedOut);
    }

    if !auth_service.verify_password(password, &user.password_hash)? {
        user.increment_failed_attempts(pool).await?;

        if user.failed_login_attempts >= config.max_login_attempts {
            user.lock_for_duration(
                pool,
                Duration::minutes(config.lockout_duration_minutes as i64),
            )
            .await?;
            log::warn!(
                "Account '{}' locked after {} failed login attempts",
                user.username,
                user.failed_login_attempts
            );
            return Ok(AuthDecision::LockedOut);
        }

        return Ok(AuthDecision::InvalidCredentials);
    }

    if user.two_factor_enabled {
        return Ok(AuthDecision::RequiresTwoFactor);
    }

    user.reset_failed_attempts(pool).await?;
    user.update_last_login(pool).await?;

    Ok(AuthDecision::Success(Box::new(user)))
}

// ======== USER METHODS ========

impl User {
    pub async fn find_by_username(pool: &SqlitePool, username: &str) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn create(
        pool: &SqlitePool,
        request: CreateUserRequest,
        role: UserRole,
        auth_service: &AuthService,
    ) -> ApiResult<User> {
        let password_hash = auth_service.hash_password(&request.password)?;
        let now = Utc::now();

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: request.username,
            email: request.email,
            password_hash,
            role: role.as_str().to_string(),
            is_active: true,
            two_factor_enabled: false,
            last_login: None,
            created_at: now,
            updated_at: now,
            failed_login_attempts: 0,
            locked_until: None,
        };

        sqlx::query(
            r#"INSERT INTO users (
                id, username, email, password_hash, role, is_active, two_factor_enabled,
                created_at, updated_at, failed_login_attempts, locked_until
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.is_active as i32)
        .bind(user.two_factor_enabled as i32)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .execute(pool)
        .await?;

        Ok(user)
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    pub async fn update_last_login(&self, pool: &SqlitePool) -> ApiResult<()> {
        sqlx::query("UPDATE users SET last_login = datetime('now') WHERE id = ?")
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn change_password(
        &self,
        pool: &SqlitePool,
        current_password: &str,
        new_password: &str,
        auth_service: &AuthService,
    ) -> ApiResult<()> {
        if !auth_service.verify_password(current_password, &self.password_hash)? {
            return Err(ApiError::AuthError("Current password is incorrect".to_string()));
        }

        let new_hash = auth_service.hash_password(new_password)?;
        self.store_password_hash(pool, &new_hash).await
    }

    pub async fn set_password(
        &self,
        pool: &SqlitePool,
        new_password: &str,
        auth_service: &AuthService,
    ) -> ApiResult<()> {
        let new_hash = auth_service.hash_password(new_password)?;
        self.store_password_hash(pool, &new_hash).await
    }

    async fn store_password_hash(&self, pool: &SqlitePool, new_hash: &str) -> ApiResult<()> {
        sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = datetime('now'),
             failed_login_attempts = 0, locked_until = NULL WHERE id = ?",
        )
        .bind(new_hash)
        .bind(&self.id)
        .execute(pool)
        .await?;
        Ok(())
    }

    // Lockout state management

    pub fn is_locked(&self) -> bool {
        if let Some(locked_until) = self.locked_until {
            Utc::now() < locked_until
        } else {
            false
        }
    }

    pub async fn increment_failed_attempts(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        self.failed_login_attempts += 1;
        sqlx::query("UPDATE users SET failed_login_attempts = ? WHERE id = ?")
            .bind(self.failed_login_attempts)
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn lock_for_duration(&mut self, pool: &SqlitePool, duration: Duration) -> ApiResult<()> {
        self.locked_until = Some(Utc::now() + duration);
        sqlx::query("UPDATE users SET locked_until = ? WHERE id = ?")
            .bind(self.locked_until)
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn reset_failed_attempts(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        self.failed_login_attempts = 0;
        self.locked_until = None;
        sqlx::query("UPDATE users SET failed_login_attempts = 0, locked_until = NULL WHERE id = ?")
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub fn get_role(&self) -> UserRole {
        UserRole::from_str(&self.role).unwrap_or(UserRole::Labo)
    }
}

// ======== HELPER FUNCTIONS ========

pub fn get_current_user(req: &HttpRequest) -> ApiResult<Claims> {
    req.extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("No user information found".to_string()))
}

/// Authorization gate for write handlers: resolves the caller and checks
/// the action against their role.
pub fn require_action(req: &HttpRequest, action: Action) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    if can_perform(&claims.role, action) {
        Ok(claims)
    } else {
        Err(ApiError::Forbidden("Insufficient permissions".to_string()))
    }
}

// ======== JWT MIDDLEWARE ========

pub async fn jwt_middleware(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let token = credentials.token();

    let auth_service = match req.app_data::<web::Data<std::sync::Arc<AuthService>>>() {
        Some(svc) => svc,
        None => {
            log::error!("AuthService not found in app data");
            return Err((
                ApiError::InternalServerError("Auth service not available".to_string()).into(),
                req,
            ));
        }
    };

    match auth_service.verify_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(req)
        }
        Err(err) => {
            log::warn!("JWT verification failed: {}", err);
            Err((err.into(), req))
        }
    }
}
