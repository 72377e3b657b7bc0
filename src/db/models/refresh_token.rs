use crate::db::schema::refresh_tokens;
use chrono::{DateTime, Utc};
use diesel::{Insertable, Queryable, Selectable};
use uuid::Uuid;

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    /// Le credential signé lui-même. Index unique en base.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Enregistrement durable d'un refresh token émis.
///
/// Les enregistrements révoqués ne sont jamais supprimés: ils servent de
/// trace d'audit et de signal de replay (un token révoqué représenté est
/// traité comme une réutilisation).
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = refresh_tokens)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    #[allow(dead_code)]
    pub created_at: DateTime<Utc>,
    /// Une fois à true, jamais remis à false.
    pub revoked: bool,
}
