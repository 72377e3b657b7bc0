use bcrypt::{DEFAULT_COST, hash, verify};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    HashingFailed(bcrypt::BcryptError),
    #[error("Password verification failed: {0}")]
    VerificationFailed(bcrypt::BcryptError),
}

pub struct PasswordManager;

impl PasswordManager {
    /// Hash salé et irréversible (bcrypt, coût par défaut).
    pub fn hash(password: &str) -> Result<String, PasswordError> {
        hash(password, DEFAULT_COST).map_err(PasswordError::HashingFailed)
    }

    pub fn verify(password: &str, hash: &str) -> Result<bool, PasswordError> {
        verify(password, hash).map_err(PasswordError::VerificationFailed)
    }
}
