use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;
use tracing::info;

use crate::{
    auth::PasswordService,
    errors::{AppError, Result},
    handlers::AppState,
    middleware::AUTH_COOKIE,
    models::{AuthResponse, CreateUserRequest, LoginRequest, NewUser, Role, User, UserProfile},
};

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}; SameSite=Lax",
        AUTH_COOKIE, token, max_age_secs
    )
}

fn issue_session(state: &AppState, user: User) -> Result<(String, AuthResponse)> {
    let token = state.jwt.generate_token(user.id, &user.email, user.role)?;
    let cookie = session_cookie(&token, state.jwt.token_duration().num_seconds());
    Ok((cookie, AuthResponse { token, user: UserProfile::from(user) }))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid input or email already registered")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<impl IntoResponse> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Name is required"));
    }

    let email = request.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::validation("Invalid email format"));
    }

    PasswordService::validate_password_strength(&request.password)?;

    if state.database.users().find_user_by_email(&email).await?.is_some() {
        return Err(AppError::validation("User with this email already exists"));
    }

    let password_hash = PasswordService::hash_password(&request.password)?;
    let user = state
        .database
        .users()
        .create_user(NewUser {
            email,
            name: name.to_string(),
            password_hash,
            role: Role::User,
            diabetes_type: request.diabetes_type.filter(|t| !t.trim().is_empty()),
        })
        .await?;
    info!("Registered user {}", user.id);

    let (cookie, response) = issue_session(&state, user)?;
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "message": "User registered successfully",
            "data": response
        })),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = state
        .database
        .users()
        .find_user_by_email(request.email.trim())
        .await?
        .ok_or_else(invalid)?;

    if !PasswordService::verify_password(&request.password, &user.password_hash) {
        return Err(invalid());
    }

    let (cookie, response) = issue_session(&state, user)?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "message": "Login successful",
            "data": response
        })),
    ))
}

/// Tokens are stateless; logging out only clears the browser cookie.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "Session cookie cleared")),
    tag = "auth"
)]
pub async fn logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, session_cookie("", 0))],
        Json(json!({
            "message": "Logged out successfully"
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc", 86400);
        assert!(cookie.starts_with("auth-token=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=86400"));
    }
}
