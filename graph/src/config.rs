//! Module dedicated to the drive configuration.

use std::time::Duration;

/// The default Microsoft Graph endpoint.
pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Payloads below this size go through the simple, single-request
/// upload path (4 MiB).
pub const DEFAULT_SIMPLE_UPLOAD_THRESHOLD: u64 = 4 * 1024 * 1024;

/// The size of one upload session chunk (10 MiB). Graph requires
/// chunk sizes to be a multiple of 320 KiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// How many times the same byte range is sent before the whole
/// upload is given up.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// The base delay of the exponential chunk retry backoff.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// The drive configuration.
///
/// The configuration is immutable and injected into the [`Drive`] at
/// construction, there is no ambient lookup.
///
/// [`Drive`]: crate::Drive
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DriveConfig {
    /// Base URL of the Graph endpoint. Overridable for testing or
    /// for any other range-upload-capable, Graph-shaped store.
    pub base_url: String,

    /// Payloads at or above this size use a resumable upload session
    /// instead of a single content PUT.
    pub simple_upload_threshold: u64,

    /// Size of one upload session chunk, in bytes.
    pub chunk_size: u64,

    /// How many times the same byte range is retried on transport
    /// failure.
    pub max_retry_attempts: u32,

    /// Base delay of the exponential chunk retry backoff.
    pub retry_delay: Duration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            simple_upload_threshold: DEFAULT_SIMPLE_UPLOAD_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}
