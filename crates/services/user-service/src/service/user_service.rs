//! User service - user management use cases.
//!
//! Every write goes to the database first. Only after it commits are the
//! membership filters updated and the cached views invalidated. A new row
//! whose identifiers cannot be recorded in the filters is deleted again.

use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

use common::{AppError, AppResult};
use domain::{Identifier, IdentifierKind, NewUser, Password, User, UserPatch, UserResponse, UserRole};

use super::validator::UniquenessValidator;
use crate::cache::{CachedView, MutationEvent, ResultCache};
use crate::repository::UserRepository;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// User service trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserService: Send + Sync {
    /// Register a user. Fails with a conflict naming the first taken field.
    async fn create_user(&self, new_user: NewUser) -> AppResult<User>;

    /// Check a password for the user with this username or email.
    /// An unknown user and a wrong password fail the same way.
    async fn authenticate(&self, login: &Identifier, password: &str) -> AppResult<User>;

    /// All users (served from the result cache when possible)
    async fn list_users(&self) -> AppResult<Vec<UserResponse>>;

    /// Fetch one user directly from the database
    async fn get_profile(&self, username: &Identifier) -> AppResult<User>;

    /// Change the display name
    async fn update_user(&self, username: &Identifier, full_name: String) -> AppResult<User>;

    /// Change the role
    async fn update_role(&self, username: &Identifier, role: UserRole) -> AppResult<User>;

    /// Permanently delete a user, returning the removed record
    async fn delete_user(&self, username: &Identifier) -> AppResult<User>;
}

/// Coordinates the database, membership filters and result cache.
pub struct UserManager {
    repo: Arc<dyn UserRepository>,
    usernames: Arc<UniquenessValidator>,
    emails: Arc<UniquenessValidator>,
    cache: ResultCache,
}

impl UserManager {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        usernames: Arc<UniquenessValidator>,
        emails: Arc<UniquenessValidator>,
        cache: ResultCache,
    ) -> Self {
        Self {
            repo,
            usernames,
            emails,
            cache,
        }
    }

    fn validator(&self, kind: IdentifierKind) -> &UniquenessValidator {
        match kind {
            IdentifierKind::Username => &self.usernames,
            IdentifierKind::Email => &self.emails,
        }
    }

    /// Remove a row whose identifiers could not be recorded in the filters.
    async fn roll_back(&self, user: &User, username: &Identifier) {
        match self.repo.delete(username).await {
            Ok(_) => warn!(
                user_id = %user.id,
                "Signup rolled back: identifiers could not be recorded in the membership filters"
            ),
            Err(e) => error!(
                user_id = %user.id,
                error = %e,
                "User committed but missing from a membership filter and rollback failed; run `filter rebuild`"
            ),
        }
    }

    async fn ensure_available(&self, identifier: &Identifier) -> AppResult<()> {
        let availability = self.validator(identifier.kind()).check(identifier).await?;
        if !availability.available {
            return Err(AppError::conflict(identifier.kind().label()));
        }
        Ok(())
    }
}

/// Argon2 hash of a throwaway password, computed once.
fn decoy_hash() -> &'static str {
    static DECOY: OnceLock<String> = OnceLock::new();
    DECOY.get_or_init(|| {
        Password::new("decoy-password-never-issued")
            .map(Password::into_string)
            .unwrap_or_default()
    })
}

#[async_trait]
impl UserService for UserManager {
    async fn create_user(&self, new_user: NewUser) -> AppResult<User> {
        self.ensure_available(&new_user.username).await?;
        self.ensure_available(&new_user.email).await?;

        let username = new_user.username.clone();
        let email = new_user.email.clone();

        // The unique indexes catch races the pre-check cannot see
        let user = self.repo.insert(new_user).await?;
        info!(user_id = %user.id, username = %user.username, "User created");

        let recorded = match self.usernames.filter().insert(&username).await {
            Ok(()) => self.emails.filter().insert(&email).await,
            Err(e) => Err(e),
        };

        if let Err(e) = recorded {
            // A stored identifier missing from its filter would read as free
            self.roll_back(&user, &username).await;
            self.cache.invalidate(MutationEvent::UserDeleted).await;
            return Err(e);
        }

        self.cache.invalidate(MutationEvent::UserCreated).await;
        Ok(user)
    }

    async fn authenticate(&self, login: &Identifier, password: &str) -> AppResult<User> {
        let found = self.repo.find_by_identifier(login).await?;

        // Unknown users are checked against a decoy hash so both failures cost the same
        let stored = match &found {
            Some(user) => Password::from_hash(user.password_hash.clone()),
            None => Password::from_hash(decoy_hash().to_string()),
        };
        let verified = stored.verify(password);

        match found {
            Some(user) if verified => {
                info!(user_id = %user.id, "User logged in");
                Ok(user)
            }
            _ => {
                info!(kind = %login.kind(), "Login rejected");
                Err(AppError::Unauthorized)
            }
        }
    }

    async fn list_users(&self) -> AppResult<Vec<UserResponse>> {
        self.cache
            .get_or_compute(CachedView::UserListing, || async {
                let users = self.repo.list().await?;
                Ok(users.into_iter().map(UserResponse::from).collect())
            })
            .await
    }

    async fn get_profile(&self, username: &Identifier) -> AppResult<User> {
        self.repo
            .find_by_identifier(username)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn update_user(&self, username: &Identifier, full_name: String) -> AppResult<User> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(AppError::validation("Full name must not be empty"));
        }

        let patch = UserPatch {
            full_name: Some(full_name.to_string()),
            role: None,
        };
        let user = self.repo.update(username, patch).await?;
        self.cache.invalidate(MutationEvent::UserUpdated).await;

        info!(user_id = %user.id, "User updated");
        Ok(user)
    }

    async fn update_role(&self, username: &Identifier, role: UserRole) -> AppResult<User> {
        let patch = UserPatch {
            full_name: None,
            role: Some(role),
        };
        let user = self.repo.update(username, patch).await?;
        self.cache.invalidate(MutationEvent::UserRoleChanged).await;

        info!(user_id = %user.id, role = %role, "User role changed");
        Ok(user)
    }

    async fn delete_user(&self, username: &Identifier) -> AppResult<User> {
        // Filters cannot forget; the identifier stays "possibly present"
        // and later checks fall through to the database.
        let user = self.repo.delete(username).await?;
        self.cache.invalidate(MutationEvent::UserDeleted).await;

        info!(user_id = %user.id, "User deleted");
        Ok(user)
    }
}
