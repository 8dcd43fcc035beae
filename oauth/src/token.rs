//! Module dedicated to the OAuth 2.0 token representation.
//!
//! The core structure of the module is the [`OAuthToken`], the pair
//! of access and refresh tokens returned by the token endpoint
//! together with its expiry.

use chrono::{DateTime, Duration, Utc};

/// The default skew subtracted from the token expiry when deciding
/// whether an access token is still usable.
pub const DEFAULT_EXPIRY_SKEW: i64 = 60;

/// The OAuth 2.0 token, as returned by the authorization code or the
/// refresh token flow.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OAuthToken {
    /// Access token returned by the token endpoint and used to access
    /// protected resources.
    pub access_token: String,

    /// Refresh token used to obtain a new access token, if the
    /// authorization server supports it.
    pub refresh_token: Option<String>,

    /// Instant past which the access token is no longer valid.
    pub expires_at: Option<DateTime<Utc>>,

    /// Scopes granted by the authorization server.
    pub scopes: Vec<String>,
}

impl OAuthToken {
    /// Returns `true` when the access token can no longer be used at
    /// the given instant, taking the given skew into account.
    ///
    /// A token without expiry never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at - skew,
            None => false,
        }
    }

    /// Returns `true` when the access token can no longer be used
    /// right now, taking the given skew into account.
    pub fn is_expired(&self, skew: Duration) -> bool {
        self.is_expired_at(Utc::now(), skew)
    }
}
