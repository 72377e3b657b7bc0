//! Implémentations en mémoire des stores, à sémantique identique aux
//! repositories Postgres. Utilisées par les tests (aucune base requise) et
//! utilisables pour une démo locale.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use uuid::Uuid;

use crate::db::error::RepositoryError;
use crate::db::models::refresh_token::{NewRefreshToken, RefreshToken};
use crate::db::models::user::{NewUser, User};
use crate::db::store::{RefreshTokenStore, UserStore};

// Un lock empoisonné n'invalide pas les données: on récupère le guard.
fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl UserStore for MemoryUserStore {
    fn create(&self, new_user: &NewUser) -> Result<User, RepositoryError> {
        let mut users = guard(&self.users);

        if users.iter().any(|u| u.email == new_user.email) {
            return Err(RepositoryError::UniqueViolation(format!(
                "duplicate key value violates unique constraint: users.email = {}",
                new_user.email
            )));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email.clone(),
            name: new_user.name.clone(),
            password_hash: new_user.password_hash.clone(),
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(guard(&self.users).iter().find(|u| u.email == email).cloned())
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(guard(&self.users).iter().find(|u| u.id == id).cloned())
    }

    fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepositoryError> {
        let mut users = guard(&self.users);
        if let Some(user) = users.iter_mut().find(|u| u.id == id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRefreshTokenStore {
    tokens: Mutex<Vec<RefreshToken>>,
}

impl MemoryRefreshTokenStore {
    fn insert_locked(
        tokens: &mut Vec<RefreshToken>,
        new_token: &NewRefreshToken,
    ) -> Result<RefreshToken, RepositoryError> {
        if tokens.iter().any(|t| t.token == new_token.token) {
            return Err(RepositoryError::UniqueViolation(format!(
                "duplicate key value violates unique constraint: refresh_tokens.token = {}",
                new_token.token
            )));
        }

        let record = RefreshToken {
            id: Uuid::new_v4(),
            user_id: new_token.user_id,
            token: new_token.token.clone(),
            expires_at: new_token.expires_at,
            created_at: Utc::now(),
            revoked: false,
        };
        tokens.push(record.clone());
        Ok(record)
    }
}

impl RefreshTokenStore for MemoryRefreshTokenStore {
    fn create(&self, new_token: &NewRefreshToken) -> Result<RefreshToken, RepositoryError> {
        let mut tokens = guard(&self.tokens);
        Self::insert_locked(&mut tokens, new_token)
    }

    fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        Ok(guard(&self.tokens)
            .iter()
            .find(|t| t.token == token)
            .cloned())
    }

    fn revoke(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut tokens = guard(&self.tokens);
        if let Some(record) = tokens.iter_mut().find(|t| t.id == id) {
            record.revoked = true;
        }
        Ok(())
    }

    fn revoke_all_for_user(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        let mut tokens = guard(&self.tokens);
        for record in tokens.iter_mut().filter(|t| t.user_id == user_id) {
            record.revoked = true;
        }
        Ok(())
    }

    fn rotate(
        &self,
        old_id: Uuid,
        new_token: &NewRefreshToken,
    ) -> Result<Option<RefreshToken>, RepositoryError> {
        // Un seul lock: équivalent de la transaction Postgres.
        let mut tokens = guard(&self.tokens);

        let Some(old) = tokens.iter_mut().find(|t| t.id == old_id && !t.revoked) else {
            return Ok(None);
        };
        old.revoked = true;

        Self::insert_locked(&mut tokens, new_token).map(Some)
    }
}
