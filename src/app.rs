// src/app.rs

use axum::{
    Router,
    extract::FromRef,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::jwt::TokenSigner;
use crate::auth::services::AuthService;
use crate::handlers::auth::{login, logout, refresh, register};
use crate::handlers::health::health;
use crate::handlers::user::{change_password, get_current_user};

/// State partagé par toutes les routes: le service pour les handlers, le
/// signer pour l'extracteur `AuthClaims`.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AuthService>,
    pub signer: TokenSigner,
}

impl FromRef<AppState> for TokenSigner {
    fn from_ref(state: &AppState) -> Self {
        state.signer.clone()
    }
}

/// Configure les routes d'authentification
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
}

/// Configure les routes utilisateur
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_current_user))
        .route("/{id}/change-password", post(change_password))
}

/// Construit l'application complète
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth_routes())
        .nest("/users", user_routes())
        // Middleware global de tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
