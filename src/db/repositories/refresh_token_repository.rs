use crate::db::connection::get_connection;
use crate::db::error::RepositoryError;
use crate::db::models::refresh_token::{NewRefreshToken, RefreshToken};
use crate::db::schema::refresh_tokens;
use crate::db::store::RefreshTokenStore;
use diesel::prelude::*;
use uuid::Uuid;

/// Implémentation Postgres de `RefreshTokenStore`.
///
/// Les enregistrements ne sont jamais supprimés: `revoked` passe à true et y
/// reste. La coordination entre refresh concurrents repose entièrement sur la
/// transaction de `rotate`, pas sur un lock en processus. Correct avec
/// plusieurs instances du serveur partageant la même base.
pub struct RefreshTokenRepository;

impl RefreshTokenStore for RefreshTokenRepository {
    fn create(&self, new_token: &NewRefreshToken) -> Result<RefreshToken, RepositoryError> {
        let mut conn = get_connection()?;

        diesel::insert_into(refresh_tokens::table)
            .values(new_token)
            .get_result::<RefreshToken>(&mut conn)
            .map_err(Into::into)
    }

    fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        let mut conn = get_connection()?;

        refresh_tokens::table
            .filter(refresh_tokens::token.eq(token))
            .first::<RefreshToken>(&mut conn)
            .optional()
            .map_err(Into::into)
    }

    fn revoke(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut conn = get_connection()?;

        diesel::update(refresh_tokens::table.filter(refresh_tokens::id.eq(id)))
            .set(refresh_tokens::revoked.eq(true))
            .execute(&mut conn)?;

        Ok(())
    }

    fn revoke_all_for_user(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        let mut conn = get_connection()?;

        diesel::update(refresh_tokens::table.filter(refresh_tokens::user_id.eq(user_id)))
            .set(refresh_tokens::revoked.eq(true))
            .execute(&mut conn)?;

        Ok(())
    }

    fn rotate(
        &self,
        old_id: Uuid,
        new_token: &NewRefreshToken,
    ) -> Result<Option<RefreshToken>, RepositoryError> {
        let mut conn = get_connection()?;

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            // Le prédicat `revoked = false` fait l'arbitrage: sous deux
            // transactions concurrentes, une seule voit la ligne active.
            let retired = diesel::update(
                refresh_tokens::table
                    .filter(refresh_tokens::id.eq(old_id))
                    .filter(refresh_tokens::revoked.eq(false)),
            )
            .set(refresh_tokens::revoked.eq(true))
            .execute(conn)?;

            if retired == 0 {
                return Ok(None);
            }

            diesel::insert_into(refresh_tokens::table)
                .values(new_token)
                .get_result::<RefreshToken>(conn)
                .map(Some)
        })
        .map_err(Into::into)
    }
}
