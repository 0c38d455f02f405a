//! Shared fixtures: an in-memory user store and a fully wired service
//! running on in-process filters and cache.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use common::{AppError, AppResult, FilterConfig};
use domain::{Identifier, IdentifierKind, NewUser, Password, User, UserPatch};
use user_service_lib::api::{AppState, DatabaseHealth};
use user_service_lib::cache::{MemoryCacheStore, ResultCache};
use user_service_lib::filter::{
    FilterInfo, FilterMetadata, FilterParams, FilterStore, FilterStoreError, LocalFilterStore, MembershipFilter,
};
use user_service_lib::repository::UserRepository;
use user_service_lib::service::{UniquenessValidator, UserManager};

/// User store that enforces unique usernames and emails like the real
/// indexes do, and counts lookups.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<Uuid, User>>,
    lookups: AtomicUsize,
}

impl InMemoryUserRepository {
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    fn find(users: &HashMap<Uuid, User>, identifier: &Identifier) -> Option<User> {
        users
            .values()
            .find(|u| match identifier.kind() {
                IdentifierKind::Username => u.username == identifier.as_str(),
                IdentifierKind::Email => u.email == identifier.as_str(),
            })
            .cloned()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_identifier(&self, identifier: &Identifier) -> AppResult<Option<User>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(Self::find(&self.users.lock().unwrap(), identifier))
    }

    async fn insert(&self, new_user: NewUser) -> AppResult<User> {
        let mut users = self.users.lock().unwrap();
        if Self::find(&users, &new_user.username).is_some() {
            return Err(AppError::conflict("Username"));
        }
        if Self::find(&users, &new_user.email).is_some() {
            return Err(AppError::conflict("Email"));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email.into_string(),
            username: new_user.username.into_string(),
            password_hash: new_user.password.into_string(),
            full_name: new_user.full_name,
            role: Default::default(),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, username: &Identifier, patch: UserPatch) -> AppResult<User> {
        let mut users = self.users.lock().unwrap();
        let id = Self::find(&users, username).ok_or(AppError::NotFound)?.id;
        let user = users.get_mut(&id).ok_or(AppError::NotFound)?;

        if let Some(full_name) = patch.full_name {
            user.full_name = Some(full_name);
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete(&self, username: &Identifier) -> AppResult<User> {
        let mut users = self.users.lock().unwrap();
        let id = Self::find(&users, username).ok_or(AppError::NotFound)?.id;
        users.remove(&id).ok_or(AppError::NotFound)
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<_> = self.users.lock().unwrap().values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }
}

/// Filter store whose first `failures` writes time out.
pub struct FailingWrites {
    inner: Arc<LocalFilterStore>,
    failures: AtomicUsize,
}

impl FailingWrites {
    pub fn new(inner: Arc<LocalFilterStore>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl FilterStore for FailingWrites {
    async fn probe(&self) -> Result<Option<FilterInfo>, FilterStoreError> {
        self.inner.probe().await
    }

    async fn reserve(&self, metadata: &FilterMetadata) -> Result<bool, FilterStoreError> {
        self.inner.reserve(metadata).await
    }

    async fn set_bits(&self, params: FilterParams, positions: &[u64]) -> Result<bool, FilterStoreError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FilterStoreError::Timeout(Duration::from_millis(1)));
        }
        self.inner.set_bits(params, positions).await
    }

    async fn test_bits(&self, params: FilterParams, positions: &[u64]) -> Result<bool, FilterStoreError> {
        self.inner.test_bits(params, positions).await
    }

    async fn clear(&self) -> Result<(), FilterStoreError> {
        self.inner.clear().await
    }
}

struct AlwaysUp;

#[async_trait]
impl DatabaseHealth for AlwaysUp {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Every component wired together over in-process backends.
pub struct Harness {
    pub repo: Arc<InMemoryUserRepository>,
    pub username_store: Arc<LocalFilterStore>,
    pub email_store: Arc<LocalFilterStore>,
    pub cache_store: Arc<MemoryCacheStore>,
    pub usernames: Arc<UniquenessValidator>,
    pub emails: Arc<UniquenessValidator>,
    pub cache: ResultCache,
    pub service: Arc<UserManager>,
    pub config: FilterConfig,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_failing_username_writes(0).await
    }

    /// Harness whose username filter store times out on its first
    /// `failures` writes.
    pub async fn with_failing_username_writes(failures: usize) -> Self {
        let config = FilterConfig {
            capacity: 10_000,
            error_rate: 0.01,
            init_attempts: 3,
            init_backoff_ms: 1,
            ..Default::default()
        };

        let repo = Arc::new(InMemoryUserRepository::default());
        let username_store = Arc::new(LocalFilterStore::new());
        let email_store = Arc::new(LocalFilterStore::new());
        let cache_store = Arc::new(MemoryCacheStore::new());

        let username_filter =
            MembershipFilter::initialize(
                IdentifierKind::Username,
                Arc::new(FailingWrites::new(username_store.clone(), failures)),
                &config,
            )
            .await
            .unwrap();
        let email_filter = MembershipFilter::initialize(IdentifierKind::Email, email_store.clone(), &config)
            .await
            .unwrap();

        let usernames = Arc::new(UniquenessValidator::new(Arc::new(username_filter), repo.clone()));
        let emails = Arc::new(UniquenessValidator::new(Arc::new(email_filter), repo.clone()));
        let cache = ResultCache::new(cache_store.clone());
        let service = Arc::new(UserManager::new(
            repo.clone(),
            usernames.clone(),
            emails.clone(),
            cache.clone(),
        ));

        Self {
            repo,
            username_store,
            email_store,
            cache_store,
            usernames,
            emails,
            cache,
            service,
            config,
        }
    }

    pub fn state(&self) -> AppState {
        AppState::new(
            self.service.clone(),
            self.usernames.clone(),
            self.emails.clone(),
            self.cache.clone(),
            Arc::new(AlwaysUp),
        )
    }
}

/// Signup input with a pre-hashed password (skips argon2 cost).
pub fn new_user(username: &str, email: &str) -> NewUser {
    NewUser::new(
        Identifier::username(username).unwrap(),
        Identifier::email(email).unwrap(),
        Password::from_hash("hashed".to_string()),
        None,
    )
}
