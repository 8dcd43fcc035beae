//! # Error
//!
//! Module dedicated to OAuth 2.0 errors. It contains an [`Error`]
//! enum based on [`thiserror::Error`] and a type alias [`Result`].

use oauth2::{
    basic::BasicErrorResponseType, url::ParseError, RequestTokenError, StandardErrorResponse,
};
use thiserror::Error;

/// The global `Result` alias of the library.
pub type Result<T> = std::result::Result<T, Error>;

/// The global `Error` enum of the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot build auth url")]
    BuildAuthUrlError(#[source] ParseError),
    #[error("cannot build token url")]
    BuildTokenUrlError(#[source] ParseError),
    #[error("cannot build redirect url")]
    BuildRedirectUrlError(#[source] ParseError),
    #[error("cannot read token endpoint response body")]
    ReadResponseBodyError(#[source] ureq::http::Error),
    #[error("cannot send request to the token endpoint")]
    SendRequestError(#[source] ureq::Error),
    #[error("cannot exchange authorization code for an access token")]
    ExchangeCodeError(
        #[source] Box<RequestTokenError<Error, StandardErrorResponse<BasicErrorResponseType>>>,
    ),
    #[error("cannot refresh access token using the refresh token")]
    RefreshAccessTokenError(
        #[source] Box<RequestTokenError<Error, StandardErrorResponse<BasicErrorResponseType>>>,
    ),
    #[error("cannot refresh access token: no refresh token available")]
    MissingRefreshTokenError,
    #[error("cannot access token storage: {0}")]
    TokenStorageError(String),

    #[error(transparent)]
    UreqHttpError(#[from] ureq::http::Error),
    #[cfg(feature = "tokio")]
    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),
}
