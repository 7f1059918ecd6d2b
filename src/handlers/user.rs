use axum::{extract::State, response::Json};
use serde_json::json;
use tracing::info;

use crate::{
    auth::PasswordService,
    errors::{AppError, Result},
    handlers::AppState,
    middleware::AuthenticatedUser,
    models::{ChangePasswordRequest, UpdateProfileRequest, UserProfile},
};

#[utoipa::path(
    get,
    path = "/api/user/profile",
    responses(
        (status = 200, description = "Current user's profile", body = UserProfile),
        (status = 401, description = "Not signed in")
    ),
    tag = "user"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserProfile>> {
    let user = state
        .database
        .users()
        .find_user_by_id(user.id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(UserProfile::from(user)))
}

#[utoipa::path(
    put,
    path = "/api/user/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated"),
        (status = 400, description = "Empty name")
    ),
    tag = "user"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(mut update): Json<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>> {
    if let Some(name) = update.name.as_deref() {
        if name.trim().is_empty() {
            return Err(AppError::validation("Name cannot be empty"));
        }
        update.name = Some(name.trim().to_string());
    }

    let updated = state
        .database
        .users()
        .update_profile(user.id, &update)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(json!({
        "message": "Profile updated successfully",
        "data": UserProfile::from(updated)
    })))
}

#[utoipa::path(
    put,
    path = "/api/user/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Wrong current password or weak new password")
    ),
    tag = "user"
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>> {
    let stored = state
        .database
        .users()
        .find_user_by_id(user.id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !PasswordService::verify_password(&request.current_password, &stored.password_hash) {
        return Err(AppError::validation("Current password is incorrect"));
    }
    PasswordService::validate_password_strength(&request.new_password)?;

    let password_hash = PasswordService::hash_password(&request.new_password)?;
    if !state.database.users().update_password(user.id, &password_hash).await? {
        return Err(AppError::NotFound);
    }
    info!("Password changed for user {}", user.id);

    Ok(Json(json!({
        "message": "Password updated successfully"
    })))
}
