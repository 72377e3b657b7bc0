use crate::db::connection::get_connection;
use crate::db::error::RepositoryError;
use crate::db::models::user::{NewUser, User};
use crate::db::schema::users;
use crate::db::store::UserStore;
use diesel::prelude::*;
use uuid::Uuid;

/// Implémentation Postgres de `UserStore`.
pub struct UserRepository;

impl UserStore for UserRepository {
    fn create(&self, new_user: &NewUser) -> Result<User, RepositoryError> {
        let mut conn = get_connection()?;

        diesel::insert_into(users::table)
            .values(new_user)
            .get_result::<User>(&mut conn)
            .map_err(Into::into)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let mut conn = get_connection()?;

        users::table
            .filter(users::email.eq(email))
            .first::<User>(&mut conn)
            .optional()
            .map_err(Into::into)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let mut conn = get_connection()?;

        users::table
            .filter(users::id.eq(id))
            .first::<User>(&mut conn)
            .optional()
            .map_err(Into::into)
    }

    fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepositoryError> {
        let mut conn = get_connection()?;

        diesel::update(users::table.filter(users::id.eq(id)))
            .set(users::password_hash.eq(password_hash))
            .execute(&mut conn)?;

        Ok(())
    }
}
