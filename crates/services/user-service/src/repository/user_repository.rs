//! User repository: the authoritative record of users.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use uuid::Uuid;

use super::entities::user::{self, ActiveModel, Entity as UserEntity};
use common::{AppError, AppResult};
use domain::{Identifier, IdentifierKind, NewUser, User, UserPatch};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// User repository trait for dependency injection.
///
/// Identifiers arrive normalized, so lookups are exact matches.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by username or email, depending on the identifier kind
    async fn find_by_identifier(&self, identifier: &Identifier) -> AppResult<Option<User>>;

    /// Insert a new user. A duplicate username or email fails with
    /// `AppError::Conflict` naming the field.
    async fn insert(&self, new_user: NewUser) -> AppResult<User>;

    /// Apply a profile patch to the user with this username
    async fn update(&self, username: &Identifier, patch: UserPatch) -> AppResult<User>;

    /// Permanently delete the user with this username, returning the removed record
    async fn delete(&self, username: &Identifier) -> AppResult<User>;

    /// List all users, oldest first
    async fn list(&self) -> AppResult<Vec<User>>;
}

/// SeaORM implementation of UserRepository
pub struct UserStore {
    db: DatabaseConnection,
}

impl UserStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_model(&self, identifier: &Identifier) -> Result<Option<user::Model>, DbErr> {
        let column = match identifier.kind() {
            IdentifierKind::Username => user::Column::Username,
            IdentifierKind::Email => user::Column::Email,
        };

        UserEntity::find()
            .filter(column.eq(identifier.as_str()))
            .one(&self.db)
            .await
    }
}

#[async_trait]
impl UserRepository for UserStore {
    async fn find_by_identifier(&self, identifier: &Identifier) -> AppResult<Option<User>> {
        let result = self.find_model(identifier).await.map_err(AppError::from)?;
        Ok(result.map(User::from))
    }

    async fn insert(&self, new_user: NewUser) -> AppResult<User> {
        let now = chrono::Utc::now();
        let active_model = ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(new_user.username.into_string()),
            email: Set(new_user.email.into_string()),
            password_hash: Set(new_user.password.into_string()),
            full_name: Set(new_user.full_name),
            role: Set(domain::UserRole::default().as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = active_model.insert(&self.db).await.map_err(map_insert_error)?;
        Ok(User::from(model))
    }

    async fn update(&self, username: &Identifier, patch: UserPatch) -> AppResult<User> {
        let user = self.find_model(username).await?.ok_or(AppError::NotFound)?;

        let mut active: ActiveModel = user.into();
        if let Some(full_name) = patch.full_name {
            active.full_name = Set(Some(full_name));
        }
        if let Some(role) = patch.role {
            active.role = Set(role.as_str().to_string());
        }
        active.updated_at = Set(chrono::Utc::now());

        let model = active.update(&self.db).await.map_err(AppError::from)?;
        Ok(User::from(model))
    }

    async fn delete(&self, username: &Identifier) -> AppResult<User> {
        let user = self.find_model(username).await?.ok_or(AppError::NotFound)?;

        let result = UserEntity::delete_by_id(user.id)
            .exec(&self.db)
            .await
            .map_err(AppError::from)?;

        // Removed concurrently between the lookup and the delete
        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }

        Ok(User::from(user))
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let models = UserEntity::find()
            .order_by_asc(user::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(AppError::from)?;

        Ok(models.into_iter().map(User::from).collect())
    }
}

/// Translate a unique index violation into a conflict on the offending field.
fn map_insert_error(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => AppError::conflict(conflicting_field(&detail)),
        _ => AppError::from(err),
    }
}

fn conflicting_field(detail: &str) -> &'static str {
    if detail.contains("email") {
        IdentifierKind::Email.label()
    } else if detail.contains("username") {
        IdentifierKind::Username.label()
    } else {
        "User"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicting_field_from_constraint_name() {
        assert_eq!(
            conflicting_field(r#"duplicate key value violates unique constraint "idx_users_email""#),
            "Email"
        );
        assert_eq!(
            conflicting_field(r#"duplicate key value violates unique constraint "idx_users_username""#),
            "Username"
        );
        assert_eq!(conflicting_field("duplicate key"), "User");
    }

    #[test]
    fn test_non_constraint_errors_pass_through() {
        let err = map_insert_error(DbErr::Custom("boom".to_string()));
        assert!(matches!(err, AppError::Database(_)));
    }
}
