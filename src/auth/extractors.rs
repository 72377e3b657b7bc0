use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts};

use crate::auth::jwt::{Claims, TokenSigner};
use crate::error::AppError;

/// Extracteur d'authentification pour les routes protégées.
/// Valide `Authorization: Bearer <JWT>`, vérifie le token via `TokenSigner`,
/// et expose les claims utiles (notamment `sub`).
#[derive(Debug, Clone)]
pub struct AuthClaims {
    pub sub: uuid::Uuid,
    #[allow(dead_code)]
    pub iat: i64,
    #[allow(dead_code)]
    pub exp: i64,
}

impl From<Claims> for AuthClaims {
    fn from(c: Claims) -> Self {
        Self {
            sub: c.sub,
            iat: c.iat,
            exp: c.exp,
        }
    }
}

/// Implémentation de l'extracteur pour tout state exposant un `TokenSigner`.
/// Header absent, mal formé ou token invalide: même 401, aucun détail.
impl<S> FromRequestParts<S> for AuthClaims
where
    TokenSigner: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AppError::Unauthenticated)?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthenticated)?;

        // Doit être de type Bearer
        const BEARER: &str = "Bearer ";
        if !auth_str.starts_with(BEARER) {
            return Err(AppError::Unauthenticated);
        }

        let token = &auth_str[BEARER.len()..];

        // Vérifie et décode le token, avec le secret access uniquement
        let signer = TokenSigner::from_ref(state);
        let claims = signer
            .verify_access(token)
            .map_err(|_| AppError::Unauthenticated)?;

        Ok(AuthClaims::from(claims))
    }
}
