//! Run outputs on disk: the `summary.toml` index and the append-only side files.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{CanonicalKey, CatalogId};

/// File name of the run summary in the output root.
pub const SUMMARY_FILE: &str = "summary.toml";

/// One saved image in the summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryEntry {
    /// Catalog identifier of the game.
    pub catalog_id: CatalogId,
    /// True when the image sits in the review bucket.
    pub guessed: bool,
    /// Canonical key; unique within a bucket.
    pub key: CanonicalKey,
    /// Canonical name reported by the catalog.
    pub name: String,
    /// Image path relative to the output root.
    pub path: PathBuf,
}

impl SummaryEntry {
    /// Sort and uniqueness key: one image per key per bucket.
    fn slot(&self) -> (&CanonicalKey, bool) {
        return (&self.key, self.guessed);
    }
}

/// Index of the images a run saved. Entries are sorted by (key, guessed),
/// one per key and bucket.
/// Constructed only via `Summary::new()` or `Summary::parse()`, both of
/// which enforce that.
#[derive(Debug, Serialize, Deserialize)]
pub struct Summary {
    /// Saved images, ordered by key.
    pub entries: Vec<SummaryEntry>,
}

impl Summary {
    /// Build a summary from entries in processing order. When two entries
    /// share a key and bucket the later one wins, matching the file left on disk.
    pub fn new(entries: Vec<SummaryEntry>) -> Self {
        let mut entries: Vec<SummaryEntry> = entries.into_iter().rev().collect();
        // Stable sort keeps the latest entry first within each slot.
        entries.sort_by(|a, b| return a.slot().cmp(&b.slot()));
        entries.dedup_by(|later, earlier| return later.slot() == earlier.slot());
        return Self { entries };
    }

    /// Parse a summary from TOML content.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the content is not valid TOML,
    /// or `Error::SummaryCorrupt` if keys are unsorted or repeated.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let summary: Self = toml::from_str(content)?;
        enforce_summary_key_ordering(&summary.entries)?;
        return Ok(summary);
    }

    /// Read and parse a summary from disk.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, or any `parse` error.
    pub fn read(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        return Self::parse(&content);
    }

    /// Serialize to TOML.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlSer` if serialization fails.
    pub fn serialize(&self) -> Result<String, Error> {
        return Ok(toml::to_string_pretty(self)?);
    }

    /// Write the summary to disk, replacing any previous one whole.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlSer` if serialization fails,
    /// or `Error::Io` if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<(), Error> {
        let content = self.serialize()?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        return Ok(());
    }
}

// ── Side files ─────────────────────────────────────────────────────────

/// Which append-only report a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// Transient failures: `query\treason`.
    Transient,
    /// Resolved but no image saved: `name\treason`.
    Unfetchable,
    /// Queries with no match: the query verbatim.
    Unresolved,
}

impl ReportKind {
    /// File name in the output root.
    pub const fn file_name(self) -> &'static str {
        return match self {
            Self::Transient => "transient.txt",
            Self::Unfetchable => "unfetchable.txt",
            Self::Unresolved => "unresolved.txt",
        };
    }
}

/// Appends report lines under an output root. Files are created on first use
/// and never truncated.
pub struct ReportFiles {
    /// Directory holding the report files.
    root: PathBuf,
}

impl ReportFiles {
    /// Report files in `root`.
    pub fn new(root: &Path) -> Self {
        return Self { root: root.to_path_buf() };
    }

    /// Path of one report file.
    pub fn path(&self, kind: ReportKind) -> PathBuf {
        return self.root.join(kind.file_name());
    }

    /// Append one line. Embedded newlines and tabs in a field would break the
    /// line format, so they are replaced with spaces.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be opened or written.
    pub fn append(&self, kind: ReportKind, fields: &[&str]) -> Result<(), Error> {
        let line = fields.iter().map(|f| return sanitize_field(f)).collect::<Vec<_>>().join("\t");
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(self.path(kind))?;
        writeln!(file, "{line}")?;
        return Ok(());
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

/// Validate that summary slots are strictly increasing.
///
/// # Errors
///
/// Returns `Error::SummaryCorrupt` for the first out-of-order or repeated key.
fn enforce_summary_key_ordering(entries: &[SummaryEntry]) -> Result<(), Error> {
    for pair in entries.windows(2) {
        let [first, second] = pair else {
            continue;
        };
        if first.slot() >= second.slot() {
            return Err(Error::SummaryCorrupt {
                reason: format!(
                    "entries not sorted: `{}` (guessed={}) >= `{}` (guessed={})",
                    first.key, first.guessed, second.key, second.guessed
                ),
            });
        }
    }
    return Ok(());
}

/// Replace characters that would break the tab-separated line format.
fn sanitize_field(field: &str) -> String {
    return field.replace(['\n', '\r', '\t'], " ");
}
