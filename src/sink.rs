//! Filesystem sink: where downloads, normalized images, and reports land.
//!
//! ```text
//! {root}/{key}.png                      exact matches
//! {root}/{review}/{key}.png             guessed matches
//! {bucket}/originals/{key}.{ext}        raw downloads
//! ```

use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Error;
use crate::types::CanonicalKey;

/// Subdirectory of a bucket holding raw downloads.
const ORIGINALS_DIR: &str = "originals";

/// Extension of normalized output images.
pub const IMAGE_EXT: &str = "png";

/// Empty file written and removed at open to check the root is writable.
const WRITE_CHECK_FILE: &str = ".gamethumb-write-check";

/// Output root with a primary and a review bucket.
#[derive(Debug, Clone)]
pub struct OutputSink {
    /// Bucket for guessed resolutions, inside `root`.
    review: PathBuf,
    /// Primary bucket and home of the report files.
    root: PathBuf,
}

impl OutputSink {
    /// Create the output root (if needed) and check it can be written.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutputNotWritable` if the directory cannot be created
    /// or a file cannot be written into it.
    pub fn open(root: &Path, review_dir: &Path) -> Result<Self, Error> {
        let not_writable = |e: std::io::Error| {
            return Error::OutputNotWritable { path: root.to_path_buf(), reason: e.to_string() };
        };
        std::fs::create_dir_all(root).map_err(not_writable)?;
        let check = root.join(WRITE_CHECK_FILE);
        std::fs::write(&check, b"").map_err(not_writable)?;
        std::fs::remove_file(&check).map_err(not_writable)?;

        return Ok(Self { review: root.join(review_dir), root: root.to_path_buf() });
    }

    /// The output root.
    pub fn root(&self) -> &Path {
        return &self.root;
    }

    /// Directory for exact (`false`) or guessed (`true`) results.
    pub fn bucket_dir(&self, guessed: bool) -> &Path {
        if guessed {
            return &self.review;
        }
        return &self.root;
    }

    /// Where the raw download for `key` is stored.
    pub fn original_path(&self, key: &CanonicalKey, guessed: bool, ext: &str) -> PathBuf {
        return self.bucket_dir(guessed).join(ORIGINALS_DIR).join(format!("{key}.{ext}"));
    }

    /// Where the normalized image for `key` is stored.
    pub fn image_path(&self, key: &CanonicalKey, guessed: bool) -> PathBuf {
        return self.bucket_dir(guessed).join(format!("{key}.{IMAGE_EXT}"));
    }

    /// Write `bytes` to `path` through a sibling temp file, so an existing
    /// file is replaced whole or not at all.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from directory creation, writing, or renaming.
    pub fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        return write_atomic(path, bytes);
    }

    /// Remove `originals` directories left empty after normalization.
    pub fn remove_empty_originals(&self) {
        for guessed in [false, true] {
            let dir = self.bucket_dir(guessed).join(ORIGINALS_DIR);
            // Fails harmlessly when the directory is missing or still has files.
            if std::fs::remove_dir(&dir).is_ok() {
                debug!(dir = %dir.display(), "removed empty originals directory");
            }
        }
    }
}

/// Write `bytes` to `path` via `path.tmp` and a rename, creating parent directories.
///
/// # Errors
///
/// Returns the I/O error from directory creation, writing, or renaming.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| return !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    let result = write_then_rename(&tmp, path, bytes);
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    return result;
}

/// `foo.png` → `foo.png.tmp`
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    return path.with_file_name(name);
}

/// Write and sync `tmp`, then rename it over `path`.
fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(tmp, path)?;
    return Ok(());
}
