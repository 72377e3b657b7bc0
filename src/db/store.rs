//! Contrats de persistance du cycle de vie des sessions.
//!
//! Le `AuthService` ne parle qu'à ces traits; les implémentations sont les
//! repositories diesel (production) et les stores en mémoire (tests, démo
//! locale sans base).

use crate::db::error::RepositoryError;
use crate::db::models::refresh_token::{NewRefreshToken, RefreshToken};
use crate::db::models::user::{NewUser, User};
use uuid::Uuid;

pub trait UserStore: Send + Sync {
    /// L'email est unique: une collision remonte en `UniqueViolation`.
    fn create(&self, new_user: &NewUser) -> Result<User, RepositoryError>;
    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;
    fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepositoryError>;
}

/// Seul le `AuthService` mutate ce store. Toute mutation est durable avant
/// que l'appel ne retourne: un token révoqué n'est plus jamais utilisable.
pub trait RefreshTokenStore: Send + Sync {
    /// Insère avec `revoked = false`. Une collision de token (improbable vu
    /// l'entropie du signer) remonte en `UniqueViolation`.
    fn create(&self, new_token: &NewRefreshToken) -> Result<RefreshToken, RepositoryError>;

    /// Lookup exact. Aucun filtrage d'expiration ici: c'est au manager de
    /// distinguer un token expiré d'un signal de réutilisation.
    fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, RepositoryError>;

    /// Idempotent: révoquer un token déjà révoqué est un succès.
    fn revoke(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// Révocation de masse pour le lockout de réutilisation. Idempotent.
    fn revoke_all_for_user(&self, user_id: Uuid) -> Result<(), RepositoryError>;

    /// Rotation atomique: révoque l'ancien enregistrement s'il est encore
    /// actif ET insère le nouveau, dans la même transaction. Retourne `None`
    /// (sans rien insérer) si l'ancien était déjà révoqué, c'est-à-dire si un
    /// appel concurrent a gagné la course.
    fn rotate(
        &self,
        old_id: Uuid,
        new_token: &NewRefreshToken,
    ) -> Result<Option<RefreshToken>, RepositoryError>;
}
