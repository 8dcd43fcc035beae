//! Shared fixtures of the integration tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use backup::{
    transport::{self, ItemMetadata, ObjectStore, ProgressFn, RemoteItem},
    BackupConfig,
};
use chrono::Utc;

/// One object held by the fake store.
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub size: u64,
    pub checksum: Option<String>,
}

/// In-memory [`ObjectStore`] standing in for the cloud drive.
///
/// Uploads below the threshold count as simple uploads, the rest as
/// chunked ones, mirroring how the real transport picks its path.
#[derive(Default)]
pub struct FakeTransport {
    pub threshold: u64,
    pub objects: Mutex<HashMap<String, StoredObject>>,
    pub small_uploads: AtomicUsize,
    pub large_uploads: AtomicUsize,
    /// Remote paths reported missing even when an object is stored.
    pub missing: Mutex<HashSet<String>>,
    /// Local paths whose upload fails.
    pub failing: Mutex<HashSet<PathBuf>>,
    /// When set, existence probes fail with a transport error.
    pub fail_exists: Mutex<bool>,
}

impl FakeTransport {
    pub fn new(threshold: u64) -> Arc<Self> {
        Arc::new(Self {
            threshold,
            ..Default::default()
        })
    }

    pub fn upload_count(&self) -> usize {
        self.small_uploads.load(Ordering::SeqCst) + self.large_uploads.load(Ordering::SeqCst)
    }

    pub fn mark_missing(&self, remote: &str) {
        self.missing.lock().unwrap().insert(remote.to_owned());
    }

    pub fn fail_upload_of(&self, local: &Path) {
        self.failing.lock().unwrap().insert(local.to_owned());
    }

    pub fn set_checksum(&self, remote: &str, checksum: &str) {
        if let Some(object) = self.objects.lock().unwrap().get_mut(remote) {
            object.checksum = Some(checksum.to_owned());
        }
    }
}

#[async_trait]
impl ObjectStore for FakeTransport {
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        _progress: Option<ProgressFn>,
    ) -> transport::Result<RemoteItem> {
        if self.failing.lock().unwrap().contains(local) {
            return Err(transport::Error::StoreError(format!(
                "upload of {} refused",
                local.display()
            )));
        }

        let size = fs::metadata(local)
            .map_err(|err| transport::Error::StoreError(err.to_string()))?
            .len();

        if size >= self.threshold {
            self.large_uploads.fetch_add(1, Ordering::SeqCst);
        } else {
            self.small_uploads.fetch_add(1, Ordering::SeqCst);
        }

        self.objects.lock().unwrap().insert(
            remote.to_owned(),
            StoredObject {
                size,
                checksum: None,
            },
        );
        self.missing.lock().unwrap().remove(remote);

        Ok(RemoteItem {
            id: format!("item-{remote}"),
            name: remote.rsplit('/').next().unwrap_or(remote).to_owned(),
            size,
        })
    }

    async fn download(&self, remote: &str, _sink: &Path) -> transport::Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(remote))
    }

    async fn exists(&self, remote: &str) -> transport::Result<bool> {
        if *self.fail_exists.lock().unwrap() {
            return Err(transport::Error::StoreError(
                "existence probe refused".into(),
            ));
        }

        if self.missing.lock().unwrap().contains(remote) {
            return Ok(false);
        }

        Ok(self.objects.lock().unwrap().contains_key(remote))
    }

    async fn metadata(&self, remote: &str) -> transport::Result<Option<ItemMetadata>> {
        let objects = self.objects.lock().unwrap();

        Ok(objects.get(remote).map(|object| ItemMetadata {
            id: format!("item-{remote}"),
            name: remote.rsplit('/').next().unwrap_or(remote).to_owned(),
            size: object.size,
            last_modified_date_time: Some(Utc::now()),
            file: None,
        }))
    }

    async fn checksum(&self, remote: &str) -> transport::Result<Option<String>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects.get(remote).and_then(|object| object.checksum.clone()))
    }

    async fn delete(&self, remote: &str) -> transport::Result<bool> {
        self.objects.lock().unwrap().remove(remote);
        Ok(true)
    }
}

/// Builds a config rooted at the given temp mail directory, with a
/// short lock TTL.
pub fn config(mail_root: &Path) -> BackupConfig {
    BackupConfig {
        mail_root: mail_root.to_owned(),
        lock_ttl: Duration::from_secs(60),
        ..Default::default()
    }
}

/// Writes one mail file of the given size under the mailbox
/// directory.
pub fn write_mail(mail_root: &Path, mailbox: &str, name: &str, size: usize) -> PathBuf {
    let dir = mail_root.join(mailbox);
    fs::create_dir_all(&dir).unwrap();

    let path = dir.join(name);
    fs::write(&path, vec![b'x'; size]).unwrap();

    path
}
