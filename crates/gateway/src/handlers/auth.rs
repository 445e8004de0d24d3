//! Registration, login and session handlers

use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidateEmail};

use super::{required, ApiJson};
use crate::AppState;
use cognify_common::{
    auth::{hash_password, verify_password, AuthUser, SESSION_COOKIE},
    db::models::User,
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(max = 320))]
    pub email: Option<String>,

    #[validate(length(max = 200))]
    pub name: Option<String>,

    #[validate(length(max = 1024))]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

/// Emails are matched case-insensitively
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Create an account with a password
pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<Json<User>> {
    let email = normalize_email(required(&request.email, "email")?);
    let name = required(&request.name, "name")?;
    let password = request
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::missing("password"))?;

    request.validate()?;
    if !email.validate_email() {
        return Err(AppError::Validation {
            message: "email is not a valid address".to_string(),
            field: Some("email".to_string()),
        });
    }

    let hashed = hash_password(password)?;
    let user = state.repo.create_user(&email, name, Some(hashed)).await?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok(Json(user))
}

/// Exchange credentials for a session token, also set as a cookie
pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse> {
    let email = normalize_email(required(&request.email, "email")?);
    let password = request
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::missing("password"))?;

    let user = state
        .repo
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    // Accounts without a stored hash cannot use password login
    let valid = user
        .hashed_password
        .as_deref()
        .is_some_and(|hash| verify_password(password, hash));
    if !valid {
        tracing::debug!(user_id = %user.id, "Rejected login attempt");
        return Err(AppError::InvalidCredentials);
    }

    let token = state.jwt.generate_token(&user)?;
    let expires_in = state.jwt.expiration_secs();
    let cookie = format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, expires_in
    );

    tracing::info!(user_id = %user.id, "User logged in");

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            token,
            token_type: "Bearer",
            expires_in,
            user,
        }),
    ))
}

/// The identity behind the current session
pub async fn session(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<SessionResponse>> {
    // A token can outlive its account
    let user = state
        .repo
        .find_user_by_id(auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "Session user no longer exists".to_string(),
        })?;

    Ok(Json(SessionResponse {
        user_id: user.id,
        email: user.email,
        name: user.name,
    }))
}
