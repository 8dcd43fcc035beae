#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Rust library to upload and download files against a Microsoft
//! Graph drive.
//!
//! The main structure of this library is the [`Drive`], which exposes
//! simple and chunked resumable uploads, downloads and thin item
//! queries (existence, metadata, checksum, deletion). Every operation
//! first consults an OAuth 2.0 [`oauth::TokenStore`] and fails fast
//! with [`Error::Unauthenticated`] when no usable access token is
//! available.

pub mod config;
pub mod drive;
pub mod error;
pub mod item;
pub mod upload;

#[doc(inline)]
pub use crate::{
    config::DriveConfig,
    drive::Drive,
    error::{Error, Result},
    item::{FileHashes, ItemMetadata, RemoteItem},
    upload::{chunk_ranges, retry_backoff, ProgressFn},
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
