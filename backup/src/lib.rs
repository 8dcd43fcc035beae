#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Rust library to back up files from a mail server's filesystem to
//! a cloud object store and keep the two in eventual agreement.
//!
//! The main entry point is the [`Backend`](crate::backend::Backend),
//! built with a [`BackendBuilder`](crate::backend::BackendBuilder)
//! and exposing one operation per orchestrated job:
//!
//! - [`initial_backup`](crate::backend::Backend::initial_backup)
//! - [`sync_new`](crate::backend::Backend::sync_new)
//! - [`force_sync`](crate::backend::Backend::force_sync)
//! - [`purge_old`](crate::backend::Backend::purge_old)
//! - [`check_sizes`](crate::backend::Backend::check_sizes)
//!
//! Each operation acquires a per-mailbox advisory lock, writes its
//! terminal state to the operation log exactly once and reports
//! aggregate counts. External collaborators (the backup record store,
//! the alert store, the file enumerator, the notifier) are consumed
//! through async traits; in-memory implementations are provided for
//! all of them.

pub mod alert;
pub mod backend;
pub mod config;
pub mod error;
pub mod file;
pub mod lock;
pub mod notify;
pub mod oplog;
pub mod orchestrator;
pub mod purge;
pub mod reconcile;
pub mod record;
pub mod transport;

#[doc(inline)]
pub use crate::{
    backend::{Backend, BackendBuilder},
    config::BackupConfig,
    error::{Error, Result},
    file::FileDescriptor,
};
