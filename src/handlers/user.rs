// src/handlers/user.rs

use axum::{
    Json,
    extract::{Path, State},
};
use taskhub_api::{ChangePasswordRequest, MessageResponse, UserResponse};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::extractors::AuthClaims;
use crate::error::AppError;

/// GET /users/me
/// Profil de l'utilisateur authentifié
pub async fn get_current_user(
    claims: AuthClaims,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.service.current_user(claims.sub)?;
    Ok(Json(user))
}

/// POST /users/{id}/change-password
/// Changement de mot de passe, révoque toutes les sessions
pub async fn change_password(
    claims: AuthClaims,
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    // Un utilisateur ne change que son propre mot de passe
    if claims.sub != user_id {
        return Err(AppError::Unauthenticated);
    }

    state
        .service
        .change_password(user_id, &payload.old_password, &payload.new_password)?;
    Ok(Json(MessageResponse::new("Password updated successfully")))
}
