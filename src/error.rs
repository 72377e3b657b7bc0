// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use taskhub_api::ErrorResponse;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    // === Erreurs Repository ===
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    DatabaseError(String),

    // === Erreurs d'Authentification ===
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email already registered")]
    AlreadyExists,
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
    #[error("Authentication required")]
    Unauthenticated,

    // === Erreurs de Validation ===
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("Password too weak: {0}")]
    WeakPassword(String),
    #[error("Validation error: {0}")]
    ValidationError(String),

    // === Erreurs de Hashing/Cryptographie ===
    #[error("Password hashing failed: {0}")]
    PasswordHashingFailed(String),
    #[error("Token generation failed: {0}")]
    TokenGenerationFailed(String),

    // === Erreurs internes ===
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, internal_detail) = self.get_error_info();

        if let Some(ref detail) = internal_detail {
            tracing::error!(error_code, %status, detail, "Internal server error");
        }

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details: None,
        });

        (status, body).into_response()
    }
}

impl AppError {
    /// Récupère les informations d'erreur formatées pour la réponse HTTP
    fn get_error_info(&self) -> (StatusCode, &'static str, String, Option<String>) {
        match self {
            // 404 Not Found
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),

            // 401 Unauthorized
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid email or password".to_string(),
                None,
            ),
            AppError::InvalidRefreshToken => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid refresh token".to_string(),
                None,
            ),
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authentication required".to_string(),
                None,
            ),

            // 400 Bad Request
            AppError::AlreadyExists => (
                StatusCode::BAD_REQUEST,
                "ALREADY_EXISTS",
                "Email already registered".to_string(),
                None,
            ),
            AppError::InvalidEmail => (
                StatusCode::BAD_REQUEST,
                "INVALID_EMAIL",
                "Invalid email format".to_string(),
                None,
            ),
            AppError::WeakPassword(msg) => {
                (StatusCode::BAD_REQUEST, "WEAK_PASSWORD", msg.clone(), None)
            }
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),

            // 500 Internal Server Error
            AppError::PasswordHashingFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "HASHING_ERROR",
                "An error occurred while processing your request".to_string(),
                Some(msg.clone()),
            ),
            AppError::TokenGenerationFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TOKEN_ERROR",
                "An error occurred while generating token".to_string(),
                Some(msg.clone()),
            ),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "An error occurred with the database".to_string(),
                Some(msg.clone()),
            ),
            AppError::InternalServerError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal server error occurred".to_string(),
                Some(msg.clone()),
            ),
        }
    }

    // === Constructeurs helpers ===
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        AppError::DatabaseError(msg.into())
    }

    #[expect(dead_code, reason = "Used in unit tests")]
    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::InternalServerError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    /// Retourne le code de statut HTTP
    #[expect(dead_code, reason = "Used in unit tests")]
    pub fn status_code(&self) -> StatusCode {
        self.get_error_info().0
    }
}

// === Conversions automatiques depuis d'autres types d'erreurs ===

// Depuis RepositoryError
impl From<crate::db::error::RepositoryError> for AppError {
    fn from(err: crate::db::error::RepositoryError) -> Self {
        match err {
            crate::db::error::RepositoryError::NotFound(msg) => AppError::not_found(&msg),
            // Les services gèrent les violations d'unicité explicitement; une
            // violation qui arrive jusqu'ici est un bug de requête.
            crate::db::error::RepositoryError::UniqueViolation(msg) => AppError::database(&msg),
            crate::db::error::RepositoryError::PoolError(msg) => AppError::database(&msg),
            crate::db::error::RepositoryError::ForeignKeyViolation(msg) => AppError::database(&msg),
            crate::db::error::RepositoryError::DatabaseError(msg) => AppError::database(&msg),
        }
    }
}

// Depuis TokenError
impl From<crate::auth::jwt::TokenError> for AppError {
    fn from(err: crate::auth::jwt::TokenError) -> Self {
        match err {
            crate::auth::jwt::TokenError::GenerationFailed(e) => {
                AppError::TokenGenerationFailed(e.to_string())
            }
            crate::auth::jwt::TokenError::Expired
            | crate::auth::jwt::TokenError::InvalidSignature(_) => AppError::Unauthenticated,
        }
    }
}

// Depuis PasswordError
impl From<crate::auth::password::PasswordError> for AppError {
    fn from(err: crate::auth::password::PasswordError) -> Self {
        AppError::PasswordHashingFailed(err.to_string())
    }
}
