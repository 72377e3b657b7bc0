// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode};
use taskhub_api::{AuthResponse, LoginRequest, LogoutRequest, MessageResponse, RefreshRequest, RegisterRequest};

use crate::app::AppState;
use crate::error::AppError;

/// POST /auth/register
/// Inscription d'un nouvel utilisateur
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let response = state.service.register(payload)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /auth/login
/// Connexion d'un utilisateur
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let response = state.service.login(&payload)?;
    Ok(Json(response))
}

/// POST /auth/refresh
/// Rotation du refresh token contre une nouvelle paire
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let response = state.service.refresh(&payload)?;
    Ok(Json(response))
}

/// POST /auth/logout
/// Déconnexion, best-effort: réussit même sans corps ou avec un token inconnu
pub async fn logout(
    State(state): State<AppState>,
    payload: Option<Json<LogoutRequest>>,
) -> Json<MessageResponse> {
    let token = payload.as_ref().and_then(|p| p.refresh_token.as_deref());
    state.service.logout(token);
    Json(MessageResponse::new("Logged out successfully"))
}
