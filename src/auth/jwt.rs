use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fenêtre de validité d'un access token. Contrat externe: ne pas changer.
pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
/// Fenêtre de validité d'un refresh token. Contrat externe: ne pas changer.
pub const REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token generation failed: {0}")]
    GenerationFailed(jsonwebtoken::errors::Error),
    #[error("Token expired")]
    Expired,
    #[error("Invalid token signature: {0}")]
    InvalidSignature(jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
    /// Jitter d'unicité: deux tokens émis la même seconde pour le même
    /// utilisateur restent des chaînes distinctes.
    pub jti: Uuid,
}

/// Un token signé et l'expiration absolue embarquée dans ses claims, pour que
/// le store persiste exactement ce qui a été signé.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signe et vérifie les deux familles de credentials.
///
/// Deux secrets indépendants: la fuite d'un access token ne permet pas de
/// forger des refresh tokens, et inversement. Aucun état, aucun retry: chaque
/// échec remonte tel quel à l'appelant.
#[derive(Clone)]
pub struct TokenSigner {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl TokenSigner {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_ref()),
            access_decoding: DecodingKey::from_secret(access_secret.as_ref()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_ref()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_ref()),
        }
    }

    pub fn issue_access(&self, user_id: Uuid) -> Result<SignedToken, TokenError> {
        Self::sign(&self.access_encoding, user_id, ACCESS_TOKEN_TTL_SECONDS)
    }

    pub fn issue_refresh(&self, user_id: Uuid) -> Result<SignedToken, TokenError> {
        Self::sign(&self.refresh_encoding, user_id, REFRESH_TOKEN_TTL_SECONDS)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        Self::check(&self.access_decoding, token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        Self::check(&self.refresh_decoding, token)
    }

    fn sign(key: &EncodingKey, user_id: Uuid, ttl_seconds: i64) -> Result<SignedToken, TokenError> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(ttl_seconds);

        let claims = Claims {
            sub: user_id,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4(),
        };

        encode(&Header::default(), &claims, key)
            .map(|token| SignedToken { token, expires_at })
            .map_err(TokenError::GenerationFailed)
    }

    fn check(key: &DecodingKey, token: &str) -> Result<Claims, TokenError> {
        decode(token, key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::InvalidSignature(e),
            })
    }
}
