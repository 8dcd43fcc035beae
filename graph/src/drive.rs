//! Module dedicated to the drive client.
//!
//! The [`Drive`] wraps a blocking HTTP agent behind `spawn_blocking`
//! and addresses items by path relative to the drive root.

use std::{path::Path, sync::Arc};

use oauth::{Principal, TokenStore};
use tracing::{debug, warn};
use ureq::{
    config::Config,
    tls::{RootCerts, TlsConfig, TlsProvider},
    Agent,
};

use crate::{config::DriveConfig, item::ItemMetadata, Error, Result};

/// The drive client.
///
/// Cloning is cheap: the HTTP agent and the token store are shared.
#[derive(Clone)]
pub struct Drive {
    pub(crate) agent: Agent,
    pub(crate) config: DriveConfig,
    tokens: Arc<TokenStore>,
    principal: Principal,
}

impl Drive {
    /// Creates a new drive client bound to the given backup
    /// principal.
    pub fn new(config: DriveConfig, tokens: Arc<TokenStore>, principal: Principal) -> Self {
        let tls = TlsConfig::builder()
            .root_certs(RootCerts::PlatformVerifier)
            .provider(
                #[cfg(feature = "native-tls")]
                TlsProvider::NativeTls,
                #[cfg(feature = "rustls")]
                TlsProvider::Rustls,
            );

        let agent = Config::builder()
            .tls_config(tls.build())
            .build()
            .new_agent();

        Self {
            agent,
            config,
            tokens,
            principal,
        }
    }

    /// Returns a bearer token for the configured principal, or fails
    /// fast with [`Error::Unauthenticated`]. No remote call is
    /// attempted without one.
    pub(crate) async fn access_token(&self) -> Result<String> {
        self.tokens
            .get_valid_access_token(&self.principal)
            .await?
            .ok_or(Error::Unauthenticated)
    }

    /// Builds the URL of the item at the given path relative to the
    /// drive root. The optional suffix extends the path-based address
    /// (e.g. `:/content`).
    pub(crate) fn item_url(&self, remote: &str, suffix: &str) -> String {
        let path = remote
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        format!("{}/me/drive/root:/{path}{suffix}", self.config.base_url)
    }

    /// Checks whether an item exists at the given path.
    pub async fn exists(&self, remote: &str) -> Result<bool> {
        Ok(self.metadata(remote).await?.is_some())
    }

    /// Fetches the metadata of the item at the given path, or `None`
    /// when no item exists there.
    pub async fn metadata(&self, remote: &str) -> Result<Option<ItemMetadata>> {
        let token = self.access_token().await?;
        let url = self.item_url(remote, "");
        let agent = self.agent.clone();

        spawn_blocking(move || {
            let response = match agent
                .get(&url)
                .header("Authorization", &format!("Bearer {token}"))
                .call()
            {
                Ok(response) => response,
                Err(ureq::Error::StatusCode(404)) => return Ok(None),
                Err(err) => return Err(Error::SendRequestError(err, url.clone())),
            };

            let body = response
                .into_body()
                .read_to_vec()
                .map_err(|err| Error::SendRequestError(err, url.clone()))?;

            let metadata = serde_json::from_slice(&body)
                .map_err(|err| Error::ParseResponseError(err, url))?;

            Ok(Some(metadata))
        })
        .await?
    }

    /// Returns the SHA-256 checksum of the item at the given path.
    ///
    /// `None` either means the item does not exist or the drive did
    /// not report a hash for it.
    pub async fn checksum(&self, remote: &str) -> Result<Option<String>> {
        let metadata = self.metadata(remote).await?;
        Ok(metadata.and_then(|meta| meta.sha256().map(ToOwned::to_owned)))
    }

    /// Deletes the item at the given path. Deleting a missing item
    /// counts as success; transport failures are logged and reported
    /// as `false`.
    pub async fn delete(&self, remote: &str) -> Result<bool> {
        let token = self.access_token().await?;
        let url = self.item_url(remote, "");
        let agent = self.agent.clone();

        spawn_blocking(move || {
            match agent
                .delete(&url)
                .header("Authorization", &format!("Bearer {token}"))
                .call()
            {
                Ok(_) => true,
                Err(ureq::Error::StatusCode(404)) => {
                    debug!(url, "item already absent, nothing to delete");
                    true
                }
                Err(err) => {
                    warn!(url, error = %err, "cannot delete remote item");
                    false
                }
            }
        })
        .await
    }

    /// Streams the content of the item at the given path into the
    /// given local sink.
    ///
    /// "Could not download" is a data condition, not a crash: any
    /// transport failure is logged and reported as `Ok(false)`. Only
    /// a missing access token surfaces as an error.
    pub async fn download(&self, remote: &str, sink: &Path) -> Result<bool> {
        let token = self.access_token().await?;
        let url = self.item_url(remote, ":/content");
        let agent = self.agent.clone();
        let sink = sink.to_owned();

        spawn_blocking(move || {
            let response = match agent
                .get(&url)
                .header("Authorization", &format!("Bearer {token}"))
                .call()
            {
                Ok(response) => response,
                Err(err) => {
                    warn!(url, error = %err, "cannot download remote item");
                    return false;
                }
            };

            let body = match response.into_body().read_to_vec() {
                Ok(body) => body,
                Err(err) => {
                    warn!(url, error = %err, "cannot read remote item content");
                    return false;
                }
            };

            if let Err(err) = std::fs::write(&sink, body) {
                warn!(url, sink = %sink.display(), error = %err, "cannot write downloaded content");
                return false;
            }

            true
        })
        .await
    }
}

/// Spawns a blocking task using [`async_std`].
#[cfg(feature = "async-std")]
pub(crate) async fn spawn_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(async_std::task::spawn_blocking(f).await)
}

/// Spawns a blocking task using [`tokio`].
#[cfg(feature = "tokio")]
pub(crate) async fn spawn_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}

/// Sleeps using [`async_std`].
#[cfg(feature = "async-std")]
pub(crate) async fn sleep(duration: std::time::Duration) {
    async_std::task::sleep(duration).await
}

/// Sleeps using [`tokio`].
#[cfg(feature = "tokio")]
pub(crate) async fn sleep(duration: std::time::Duration) {
    tokio::time::sleep(duration).await
}
