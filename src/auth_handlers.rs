// src/auth_handlers.rs - Login and account management endpoints.
use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;
use validator::Validate;

use crate::auth::{
    authenticate, require_action, Action, AuthDecision, AuthService, ChangePasswordRequest,
    CreateUserRequest, LoginRequest, LoginResponse, ResetPasswordRequest, User, UserInfo, UserRole,
};
use crate::auth::get_current_user;
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::AppState;

// ======== AUTH HANDLERS ========

pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    let decision = authenticate(
        &app_state.db_pool,
        &auth_service,
        &app_state.config.auth,
        &request.username,
        &request.password,
    )
    .await?;

    let user = match decision {
        AuthDecision::Success(user) => *user,
        AuthDecision::LockedOut => {
            return Err(ApiError::AuthError(
                "Account is temporarily locked. Try again later.".to_string(),
            ));
        }
        AuthDecision::RequiresTwoFactor => {
            return Err(ApiError::AuthError(
                "Two-factor authentication required".to_string(),
            ));
        }
        AuthDecision::InvalidCredentials => {
            return Err(ApiError::Unauthorized(
                "Invalid username or password".to_string(),
            ));
        }
    };

    let token = auth_service.generate_token(&user)?;

    log::info!("User {} logged in successfully", user.username);

    let response = LoginResponse {
        token,
        expires_in: auth_service.token_expiration_seconds(),
        user: user.into(),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        response,
        "Login successful".to_string(),
    )))
}

// JWT tokens are stateless; logout is handled client-side by dropping the token.
pub async fn logout(_http_request: HttpRequest) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Logged out successfully".to_string(),
    )))
}

pub async fn get_profile(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let user = User::find_by_id(&app_state.db_pool, &claims.sub).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(UserInfo::from(user))))
}

pub async fn change_password(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<ChangePasswordRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    let user = User::find_by_id(&app_state.db_pool, &claims.sub).await?;
    user.change_password(
        &app_state.db_pool,
        &request.current_password,
        &request.new_password,
        &auth_service,
    )
    .await?;

    log::info!("User {} changed their password", user.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Password changed successfully".to_string(),
    )))
}

// ======== USER MANAGEMENT (Admin) ========

pub async fn create_user(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<CreateUserRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_action(&http_request, Action::ManageUsers)?;
    request.validate()?;

    let role = match &request.role {
        Some(role_str) => UserRole::from_str(role_str)
            .ok_or_else(|| ApiError::BadRequest("Invalid role specified".to_string()))?,
        None => UserRole::Labo,
    };

    if User::find_by_username(&app_state.db_pool, &request.username).await.is_ok() {
        return Err(ApiError::BadRequest(format!(
            "User '{}' already exists",
            request.username
        )));
    }

    let user = User::create(&app_state.db_pool, request.into_inner(), role, &auth_service).await?;

    log::info!("Admin {} created user {} ({})", claims.username, user.username, user.role);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        UserInfo::from(user),
        "User created".to_string(),
    )))
}

pub async fn delete_user(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_action(&http_request, Action::ManageUsers)?;
    let user_id = path.into_inner();

    if claims.sub == user_id {
        return Err(ApiError::BadRequest("Cannot delete your own account".to_string()));
    }

    let user = User::find_by_id(&app_state.db_pool, &user_id).await?;
    User::delete(&app_state.db_pool, &user_id).await?;

    log::info!("Admin {} deleted user {}", claims.username, user.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "User deleted".to_string(),
    )))
}

pub async fn reset_user_password(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    path: web::Path<String>,
    request: web::Json<ResetPasswordRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_action(&http_request, Action::ManageUsers)?;
    request.validate()?;

    let user = User::find_by_id(&app_state.db_pool, &path.into_inner()).await?;
    user.set_password(&app_state.db_pool, &request.new_password, &auth_service)
        .await?;

    log::info!("Admin {} reset password for user {}", claims.username, user.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Password reset".to_string(),
    )))
}
