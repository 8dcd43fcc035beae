#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Rust library to manage OAuth 2.0 token lifecycles, based on the
//! [RFC6749](https://datatracker.ietf.org/doc/html/rfc6749).
//!
//! The library exposes a [`Client`] which owns the authorization code
//! and refresh token flows for one identity provider, and a
//! [`TokenStore`] which keeps one [`OAuthToken`] per [`Principal`]
//! and guarantees that an access token is never handed out past its
//! expiry without exactly one refresh attempt first.

pub mod client;
pub mod error;
pub mod store;
pub mod token;

#[doc(inline)]
pub use crate::{
    client::{AuthorizationCodeGrant, Client, OAuthConfig},
    error::{Error, Result},
    store::{MemoryTokenStorage, Principal, TokenRefresher, TokenStorage, TokenStore},
    token::OAuthToken,
};

#[cfg(any(
    all(feature = "tokio", feature = "async-std"),
    not(any(feature = "tokio", feature = "async-std"))
))]
compile_error!("Either feature `tokio` or `async-std` must be enabled for this crate.");

#[cfg(any(
    all(feature = "rustls", feature = "native-tls"),
    not(any(feature = "rustls", feature = "native-tls"))
))]
compile_error!("Either feature `rustls` or `native-tls` must be enabled for this crate.");
