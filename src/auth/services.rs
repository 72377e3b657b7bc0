// src/auth/services.rs

use std::sync::Arc;

use chrono::Utc;
use taskhub_api::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, UserResponse};
use uuid::Uuid;

use crate::auth::jwt::{ACCESS_TOKEN_TTL_SECONDS, TokenSigner};
use crate::auth::password::PasswordManager;
use crate::db::error::RepositoryError;
use crate::db::models::refresh_token::NewRefreshToken;
use crate::db::models::user::{NewUser, User};
use crate::db::store::{RefreshTokenStore, UserStore};
use crate::error::AppError;

const MIN_PASSWORD_LENGTH: usize = 6;

// Hash bcrypt factice, vérifié quand l'email est inconnu pour que le temps de
// réponse du login ne révèle pas l'existence d'un compte.
const DUMMY_PASSWORD_HASH: &str = "$2b$12$abcdefghijklmnopqrstuvabcdefghijklmnopqrstuvwxyz01234";

/// Orchestre le cycle de vie des sessions en composant le signer et les
/// stores. Seul propriétaire des enregistrements de refresh tokens.
pub struct AuthService {
    signer: TokenSigner,
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn RefreshTokenStore>,
}

impl AuthService {
    pub fn new(
        signer: TokenSigner,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        Self {
            signer,
            users,
            tokens,
        }
    }

    /// Inscription d'un nouvel utilisateur
    pub fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AppError> {
        if !Self::is_valid_email(&request.email) {
            return Err(AppError::InvalidEmail);
        }
        if request.password.len() < MIN_PASSWORD_LENGTH {
            return Err(AppError::WeakPassword(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        if request.name.trim().is_empty() {
            return Err(AppError::validation("Name must not be empty"));
        }

        if self.users.find_by_email(&request.email)?.is_some() {
            return Err(AppError::AlreadyExists);
        }

        let password_hash = PasswordManager::hash(&request.password)?;
        let new_user = NewUser {
            email: request.email,
            name: request.name.trim().to_string(),
            password_hash,
        };

        let user = match self.users.create(&new_user) {
            Ok(user) => user,
            // Course entre le pré-check et l'insert: même erreur publique
            Err(RepositoryError::UniqueViolation(_)) => return Err(AppError::AlreadyExists),
            Err(e) => return Err(AppError::from(e)),
        };

        self.issue_pair(&user)
    }

    /// Connexion d'un utilisateur.
    ///
    /// Email inconnu et mauvais mot de passe produisent la même erreur: pas
    /// d'énumération de comptes.
    pub fn login(&self, request: &LoginRequest) -> Result<AuthResponse, AppError> {
        let Some(user) = self.users.find_by_email(&request.email)? else {
            let _ = PasswordManager::verify(&request.password, DUMMY_PASSWORD_HASH);
            return Err(AppError::InvalidCredentials);
        };

        if !PasswordManager::verify(&request.password, &user.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }

        self.issue_pair(&user)
    }

    /// Échange un refresh token contre une nouvelle paire (rotation).
    ///
    /// Chemin critique: vérification de signature sans accès base, puis
    /// détection de réutilisation, puis rotation atomique côté store.
    pub fn refresh(&self, request: &RefreshRequest) -> Result<AuthResponse, AppError> {
        if request.refresh_token.is_empty() {
            return Err(AppError::InvalidRefreshToken);
        }

        // Un token forgé ou expiré s'arrête ici: pas de lookup, pas de lockout.
        let claims = self
            .signer
            .verify_refresh(&request.refresh_token)
            .map_err(|_| AppError::InvalidRefreshToken)?;

        let Some(record) = self.tokens.find_by_token(&request.refresh_token)? else {
            return Err(AppError::InvalidRefreshToken);
        };

        // Le record n'appartient pas au sujet signé: rejet sans lockout, sinon
        // un token étranger pourrait déclencher la révocation de masse.
        if record.user_id != claims.sub {
            return Err(AppError::InvalidRefreshToken);
        }

        // Token déjà tourné ou révoqué représenté: toute la chaîne de
        // l'utilisateur est considérée compromise.
        if record.revoked {
            return Err(self.lockout(record.user_id, "revoked refresh token replayed"));
        }

        if record.expires_at < Utc::now() {
            return Err(AppError::InvalidRefreshToken);
        }

        let user = self
            .users
            .find_by_id(record.user_id)?
            .ok_or(AppError::InvalidRefreshToken)?;

        let new_refresh = self.signer.issue_refresh(user.id)?;
        let rotated = self.tokens.rotate(
            record.id,
            &NewRefreshToken {
                user_id: user.id,
                token: new_refresh.token.clone(),
                expires_at: new_refresh.expires_at,
            },
        )?;

        if rotated.is_none() {
            // Un appel concurrent a gagné la transaction avec ce même token:
            // le second présentateur est traité comme un replay.
            return Err(self.lockout(user.id, "lost concurrent rotation"));
        }

        let access = self.signer.issue_access(user.id)?;

        Ok(AuthResponse {
            access_token: access.token,
            refresh_token: new_refresh.token,
            user: UserResponse::from(user),
            expires_in: ACCESS_TOKEN_TTL_SECONDS,
        })
    }

    /// Déconnexion, best-effort: un logout répété, sans token ou avec un
    /// token inconnu reste un succès.
    pub fn logout(&self, refresh_token: Option<&str>) {
        let Some(token) = refresh_token else { return };

        match self.tokens.find_by_token(token) {
            Ok(Some(record)) => {
                if let Err(e) = self.tokens.revoke(record.id) {
                    tracing::warn!("logout: failed to revoke refresh token: {e}");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("logout: refresh token lookup failed: {e}"),
        }
    }

    /// Récupère la projection publique de l'utilisateur courant
    pub fn current_user(&self, user_id: Uuid) -> Result<UserResponse, AppError> {
        self.users
            .find_by_id(user_id)?
            .map(UserResponse::from)
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    /// Change le mot de passe et révoque toutes les sessions existantes.
    pub fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        if new_password.len() < MIN_PASSWORD_LENGTH {
            return Err(AppError::WeakPassword(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let user = self
            .users
            .find_by_id(user_id)?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if !PasswordManager::verify(old_password, &user.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }

        let new_hash = PasswordManager::hash(new_password)?;
        self.users.update_password(user.id, &new_hash)?;

        // Les sessions volées meurent avec l'ancien mot de passe
        self.tokens.revoke_all_for_user(user.id)?;
        Ok(())
    }

    /// Émet une paire access+refresh et persiste le refresh token.
    fn issue_pair(&self, user: &User) -> Result<AuthResponse, AppError> {
        let access = self.signer.issue_access(user.id)?;
        let refresh = self.signer.issue_refresh(user.id)?;

        self.tokens.create(&NewRefreshToken {
            user_id: user.id,
            token: refresh.token.clone(),
            expires_at: refresh.expires_at,
        })?;

        Ok(AuthResponse {
            access_token: access.token,
            refresh_token: refresh.token,
            user: UserResponse::from(user.clone()),
            expires_in: ACCESS_TOKEN_TTL_SECONDS,
        })
    }

    /// Révocation défensive de tous les tokens d'un utilisateur. Retourne
    /// l'erreur publique: le lockout est un effet de bord, pas une erreur à
    /// part entière.
    fn lockout(&self, user_id: Uuid, reason: &str) -> AppError {
        tracing::warn!(%user_id, reason, "refresh token reuse detected, revoking all tokens");
        if let Err(e) = self.tokens.revoke_all_for_user(user_id) {
            tracing::error!(%user_id, "lockout revocation failed: {e}");
        }
        AppError::InvalidRefreshToken
    }

    fn is_valid_email(email: &str) -> bool {
        email.contains('@') && email.contains('.') && email.len() > 5
    }
}
