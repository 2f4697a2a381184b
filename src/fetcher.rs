//! Image fetching: catalog image URL → downloaded bytes → raw file in the sink.
//!
//! `download` touches only the network and is safe to run on many threads;
//! `persist` writes to disk and runs in input order so key collisions
//! resolve last-write-wins.

use tracing::{debug, info};

use crate::catalog::{Catalog, CatalogError};
use crate::http::HttpClient;
use crate::sink::OutputSink;
use crate::types::{CanonicalKey, ImageAsset, Resolution};

/// Extension used when the image URL has none.
const FALLBACK_EXT: &str = "img";

/// Why a resolved entry produced no stored image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    /// The image host failed or refused the download.
    #[error("download failed: {reason}")]
    DownloadFailed {
        /// Failure description.
        reason: String,
    },
    /// The catalog entry carries no image.
    #[error("catalog entry has no image")]
    NoImage,
    /// The catalog could not be reached while looking up the image URL.
    #[error("catalog unavailable: {reason}")]
    Transient {
        /// Failure description.
        reason: String,
    },
    /// The bytes could not be written to the sink.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Failure description.
        reason: String,
    },
}

/// Downloaded bytes, not yet on disk.
#[derive(Debug, Clone)]
pub struct Download {
    /// Raw image bytes.
    pub bytes: Vec<u8>,
    /// The entry the image belongs to.
    pub resolution: Resolution,
    /// Where the bytes came from.
    pub source_url: String,
}

/// Fetches cover images for resolved entries.
pub struct Fetcher<'a, C: Catalog> {
    /// Catalog used to look up image URLs.
    catalog: &'a C,
    /// Client for the image host. Downloads bypass the catalog rate gate.
    http: &'a HttpClient,
    /// Destination for raw bytes.
    sink: &'a OutputSink,
}

impl<'a, C: Catalog> Fetcher<'a, C> {
    /// Build a fetcher.
    pub const fn new(catalog: &'a C, http: &'a HttpClient, sink: &'a OutputSink) -> Self {
        return Self { catalog, http, sink };
    }

    /// Look up the image URL for a resolved entry.
    ///
    /// # Errors
    ///
    /// `Transient` when the catalog is unreachable, `NoImage` when the entry
    /// is gone or has no image.
    pub fn image_url(&self, resolution: &Resolution) -> Result<String, FetchFailure> {
        let entry = self.catalog.get_entry(resolution.catalog_id).map_err(|e| {
            return match e {
                CatalogError::Transport { reason } => FetchFailure::Transient { reason },
                CatalogError::Ambiguous { .. } | CatalogError::NotFound { .. } => FetchFailure::NoImage,
            };
        })?;
        return entry.image_url.ok_or(FetchFailure::NoImage);
    }

    /// Look up the image URL and download its bytes.
    ///
    /// # Errors
    ///
    /// Any `image_url` failure, or `DownloadFailed` if the image host fails.
    pub fn download(&self, resolution: &Resolution) -> Result<Download, FetchFailure> {
        let source_url = self.image_url(resolution)?;
        debug!(name = %resolution.canonical_name, url = %source_url, "downloading");
        let bytes = self
            .http
            .get(&source_url, &[], None)
            .map_err(|e| return FetchFailure::DownloadFailed { reason: e.to_string() })?;
        return Ok(Download { bytes, resolution: resolution.clone(), source_url });
    }

    /// Write downloaded bytes to the sink under the entry's canonical key.
    ///
    /// # Errors
    ///
    /// `WriteFailed` if the sink rejects the write.
    pub fn persist(&self, download: Download) -> Result<ImageAsset, FetchFailure> {
        let Download { bytes, resolution, source_url } = download;
        let canonical_key = CanonicalKey::for_resolution(&resolution);
        let ext = extension_from_url(&source_url);
        let local_path = self.sink.original_path(&canonical_key, resolution.was_guessed, &ext);

        self.sink
            .write(&local_path, &bytes)
            .map_err(|e| return FetchFailure::WriteFailed { reason: format!("{}: {e}", local_path.display()) })?;
        info!(key = %canonical_key, bytes = bytes.len(), path = %local_path.display(), "downloaded");

        return Ok(ImageAsset { canonical_key, local_path, resolution, source_url });
    }

    /// Download and persist in one step.
    ///
    /// # Errors
    ///
    /// Any `download` or `persist` failure.
    pub fn fetch_image(&self, resolution: &Resolution) -> Result<ImageAsset, FetchFailure> {
        let download = self.download(resolution)?;
        return self.persist(download);
    }
}

/// File extension from the URL's last path segment, lower-cased.
/// Anything that is not a short alphanumeric suffix becomes `img`.
pub fn extension_from_url(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return FALLBACK_EXT.to_string();
    };
    let segment = parsed.path_segments().and_then(|mut s| return s.next_back()).unwrap_or_default();
    return match segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| return c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        },
        _ => FALLBACK_EXT.to_string(),
    };
}
