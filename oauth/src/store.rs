//! Module dedicated to the OAuth 2.0 token store.
//!
//! The core structure of the module is the [`TokenStore`], which
//! keeps one [`OAuthToken`] per [`Principal`] and owns the refresh
//! policy: a token is never handed out past `expiry - skew` without
//! exactly one refresh attempt first.

use std::{collections::HashMap, fmt, sync::Arc, sync::Mutex};

use async_trait::async_trait;
use chrono::Duration;
use tracing::{debug, warn};

use crate::{
    client::Client,
    token::{OAuthToken, DEFAULT_EXPIRY_SKEW},
    Error, Result,
};

/// The identity a token belongs to: a user or service account name
/// paired with its identity provider.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Principal {
    /// Name of the principal, usually a user or service account
    /// address.
    pub name: String,

    /// Identifier of the identity provider the token was issued by.
    pub provider: String,
}

impl Principal {
    pub fn new(name: impl ToString, provider: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.provider)
    }
}

/// The token persistence seam.
///
/// Implementors map a [`Principal`] to its current [`OAuthToken`].
/// Saving replaces the previous row for the same principal
/// atomically.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    async fn find(&self, principal: &Principal) -> Result<Option<OAuthToken>>;
    async fn save(&self, principal: &Principal, token: OAuthToken) -> Result<()>;
    async fn delete(&self, principal: &Principal) -> Result<()>;
}

/// The refresh seam consulted by the store when a token expired.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken>;
}

#[async_trait]
impl TokenRefresher for Client {
    async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken> {
        Client::refresh(self, token).await
    }
}

/// In-memory [`TokenStorage`] implementation.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    tokens: Mutex<HashMap<Principal, OAuthToken>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn find(&self, principal: &Principal) -> Result<Option<OAuthToken>> {
        let tokens = lock(&self.tokens)?;
        Ok(tokens.get(principal).cloned())
    }

    async fn save(&self, principal: &Principal, token: OAuthToken) -> Result<()> {
        let mut tokens = lock(&self.tokens)?;
        tokens.insert(principal.clone(), token);
        Ok(())
    }

    async fn delete(&self, principal: &Principal) -> Result<()> {
        let mut tokens = lock(&self.tokens)?;
        tokens.remove(principal);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|err| Error::TokenStorageError(err.to_string()))
}

/// The OAuth 2.0 token store.
///
/// Wraps a [`TokenStorage`] and a [`TokenRefresher`] and applies the
/// token lifecycle policy on top of them.
pub struct TokenStore {
    storage: Arc<dyn TokenStorage>,
    refresher: Arc<dyn TokenRefresher>,
    skew: Duration,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn TokenStorage>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            storage,
            refresher,
            skew: Duration::seconds(DEFAULT_EXPIRY_SKEW),
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Saves the given token for the given principal, replacing any
    /// previous one.
    pub async fn save(&self, principal: &Principal, token: OAuthToken) -> Result<()> {
        self.storage.save(principal, token).await
    }

    /// Returns a usable access token for the given principal, or
    /// `None` when re-authentication is required.
    ///
    /// A cached token is returned as long as it did not reach
    /// `expiry - skew`. Past that point exactly one refresh attempt
    /// is made; on refresh failure the stale row is left in place and
    /// `None` is returned. Callers must treat `None` as
    /// "re-authenticate", not as a condition to retry.
    pub async fn get_valid_access_token(&self, principal: &Principal) -> Result<Option<String>> {
        let Some(token) = self.storage.find(principal).await? else {
            debug!(%principal, "no token found, authentication required");
            return Ok(None);
        };

        if !token.is_expired(self.skew) {
            return Ok(Some(token.access_token));
        }

        debug!(%principal, "access token expired, refreshing it");

        match self.refresher.refresh(&token).await {
            Ok(mut refreshed) => {
                if refreshed.refresh_token.is_none() {
                    refreshed.refresh_token = token.refresh_token;
                }

                let access_token = refreshed.access_token.clone();
                self.storage.save(principal, refreshed).await?;

                Ok(Some(access_token))
            }
            Err(err) => {
                warn!(%principal, error = %err, "cannot refresh access token, re-authentication required");
                Ok(None)
            }
        }
    }

    /// Deletes the token of the given principal. Deleting a missing
    /// token is not an error.
    pub async fn revoke(&self, principal: &Principal) -> Result<()> {
        debug!(%principal, "revoking token");
        self.storage.delete(principal).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use super::*;

    struct FakeRefresher {
        calls: AtomicUsize,
        fail: bool,
        refresh_token: Option<String>,
    }

    impl FakeRefresher {
        fn new(fail: bool, refresh_token: Option<&str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
                refresh_token: refresh_token.map(ToString::to_string),
            }
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh(&self, _token: &OAuthToken) -> Result<OAuthToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if self.fail {
                return Err(Error::MissingRefreshTokenError);
            }

            Ok(OAuthToken {
                access_token: "refreshed".into(),
                refresh_token: self.refresh_token.clone(),
                expires_at: Some(Utc::now() + Duration::hours(1)),
                scopes: vec![],
            })
        }
    }

    fn token(expires_in_secs: i64) -> OAuthToken {
        OAuthToken {
            access_token: "cached".into(),
            refresh_token: Some("refresh".into()),
            expires_at: Some(Utc::now() + Duration::seconds(expires_in_secs)),
            scopes: vec![],
        }
    }

    fn store(refresher: Arc<FakeRefresher>) -> TokenStore {
        TokenStore::new(Arc::new(MemoryTokenStorage::new()), refresher)
            .with_skew(Duration::seconds(0))
    }

    #[tokio::test]
    async fn returns_cached_token_before_expiry() {
        let refresher = Arc::new(FakeRefresher::new(false, None));
        let store = store(refresher.clone());
        let principal = Principal::new("backup", "test");

        store.save(&principal, token(3600)).await.unwrap();

        let access = store.get_valid_access_token(&principal).await.unwrap();
        assert_eq!(access.as_deref(), Some("cached"));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refreshes_expired_token_exactly_once() {
        let refresher = Arc::new(FakeRefresher::new(false, Some("new-refresh")));
        let store = store(refresher.clone());
        let principal = Principal::new("backup", "test");

        store.save(&principal, token(-1)).await.unwrap();

        let access = store.get_valid_access_token(&principal).await.unwrap();
        assert_eq!(access.as_deref(), Some("refreshed"));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        // refreshed token is now cached
        let access = store.get_valid_access_token(&principal).await.unwrap();
        assert_eq!(access.as_deref(), Some("refreshed"));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preserves_previous_refresh_token_when_provider_omits_one() {
        let storage = Arc::new(MemoryTokenStorage::new());
        let refresher = Arc::new(FakeRefresher::new(false, None));
        let store = TokenStore::new(storage.clone(), refresher).with_skew(Duration::seconds(0));
        let principal = Principal::new("backup", "test");

        store.save(&principal, token(-1)).await.unwrap();
        store.get_valid_access_token(&principal).await.unwrap();

        let saved = storage.find(&principal).await.unwrap().unwrap();
        assert_eq!(saved.refresh_token.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn leaves_stale_token_in_place_on_refresh_failure() {
        let storage = Arc::new(MemoryTokenStorage::new());
        let refresher = Arc::new(FakeRefresher::new(true, None));
        let store =
            TokenStore::new(storage.clone(), refresher.clone()).with_skew(Duration::seconds(0));
        let principal = Principal::new("backup", "test");

        store.save(&principal, token(-1)).await.unwrap();

        let access = store.get_valid_access_token(&principal).await.unwrap();
        assert_eq!(access, None);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        let stale = storage.find(&principal).await.unwrap().unwrap();
        assert_eq!(stale.access_token, "cached");
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let refresher = Arc::new(FakeRefresher::new(false, None));
        let store = store(refresher);
        let principal = Principal::new("backup", "test");

        store.save(&principal, token(3600)).await.unwrap();
        store.revoke(&principal).await.unwrap();
        store.revoke(&principal).await.unwrap();

        let access = store.get_valid_access_token(&principal).await.unwrap();
        assert_eq!(access, None);
    }
}
