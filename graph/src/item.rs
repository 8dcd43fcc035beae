//! Module dedicated to drive item wire types.
//!
//! Graph responses are validated at the transport boundary into the
//! small typed structures of this module.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A drive item as returned after an upload.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    /// Identifier assigned by the drive.
    pub id: String,

    /// Name of the item.
    pub name: String,

    /// Size of the item content, in bytes.
    #[serde(default)]
    pub size: u64,
}

/// Metadata of an existing drive item.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub last_modified_date_time: Option<DateTime<Utc>>,
    pub file: Option<FileFacet>,
}

impl ItemMetadata {
    /// Returns the SHA-256 content hash of the item, when the drive
    /// provided one. Not all responses carry hashes.
    pub fn sha256(&self) -> Option<&str> {
        self.file
            .as_ref()
            .and_then(|file| file.hashes.as_ref())
            .and_then(|hashes| hashes.sha256_hash.as_deref())
    }
}

/// The file facet of a drive item.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    pub hashes: Option<FileHashes>,
}

/// Content hashes of a drive item file facet.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileHashes {
    pub sha1_hash: Option<String>,
    pub sha256_hash: Option<String>,
    pub quick_xor_hash: Option<String>,
}

/// A freshly created upload session.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Pre-authenticated URL the chunks are sent to.
    pub upload_url: String,
    pub expiration_date_time: Option<DateTime<Utc>>,
}

/// The response to one uploaded chunk: either the session reports the
/// next expected ranges, or (on the final chunk) the created item.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ChunkResponse {
    Item(RemoteItem),
    Progress {
        #[serde(rename = "nextExpectedRanges")]
        next_expected_ranges: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uploaded_item() {
        let json = r#"{
            "id": "0123",
            "name": "message.eml",
            "size": 1024,
            "file": { "hashes": { "sha256Hash": "AB12", "quickXorHash": "xor=" } }
        }"#;

        let meta: ItemMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.id, "0123");
        assert_eq!(meta.size, 1024);
        assert_eq!(meta.sha256(), Some("AB12"));
    }

    #[test]
    fn metadata_without_hashes_has_no_checksum() {
        let json = r#"{ "id": "0123", "name": "message.eml" }"#;

        let meta: ItemMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.size, 0);
        assert_eq!(meta.sha256(), None);
    }

    #[test]
    fn chunk_response_distinguishes_progress_from_item() {
        let progress: ChunkResponse =
            serde_json::from_str(r#"{ "nextExpectedRanges": ["1048576-"] }"#).unwrap();
        assert!(matches!(progress, ChunkResponse::Progress { .. }));

        let item: ChunkResponse =
            serde_json::from_str(r#"{ "id": "0123", "name": "message.eml", "size": 42 }"#).unwrap();
        assert!(matches!(item, ChunkResponse::Item(_)));
    }
}
