//! Core domain types: queries, resolutions, ranking candidates, and canonical keys.

use std::fmt;
use std::path::PathBuf;

/// Character that joins the words of a canonical key.
const KEY_JOIN: char = '_';

/// Numeric identifier of a catalog entry.
pub type CatalogId = u64;

/// A trimmed, non-empty line of user input. The unit of work for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    /// Build a query from a raw input line. Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        return Some(Self(trimmed.to_string()));
    }

    /// The query text exactly as the user wrote it (minus surrounding whitespace).
    pub fn as_str(&self) -> &str {
        return &self.0;
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

/// Output of successful name resolution. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Resolution {
    /// Primary name of the catalog entry.
    pub canonical_name: String,
    /// Catalog identifier of the entry.
    pub catalog_id: CatalogId,
    /// The user query this resolution answers.
    pub query: String,
    /// True when the entry came from the popularity-ranked fallback search.
    pub was_guessed: bool,
}

/// An unranked member of a fallback search result.
/// `popularity` is `None` when the catalog reports no data; such
/// candidates never win a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Catalog identifier of the candidate.
    pub catalog_id: CatalogId,
    /// Vote count reported by the catalog, if any.
    pub popularity: Option<u64>,
}

/// Filesystem-safe key derived from a canonical name: lower-cased,
/// punctuation stripped, whitespace runs joined by a single underscore.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct CanonicalKey(
    /// The key text.
    pub String,
);

impl CanonicalKey {
    /// Derive the key for a name. Idempotent: deriving from a key yields the same key.
    ///
    /// The join character survives stripping so that re-deriving never
    /// collapses `ticket_to_ride` into `tickettoride`.
    pub fn from_name(name: &str) -> Self {
        let stripped: String = name
            .to_lowercase()
            .chars()
            .filter(|c| return c.is_alphanumeric() || c.is_whitespace() || *c == KEY_JOIN)
            .collect();
        let joined = stripped.split_whitespace().collect::<Vec<_>>().join("_");
        return Self(joined);
    }

    /// Key for a resolved entry. Names with no usable characters fall back to the catalog id.
    pub fn for_resolution(resolution: &Resolution) -> Self {
        let key = Self::from_name(&resolution.canonical_name);
        if key.0.is_empty() {
            return Self(format!("game_{}", resolution.catalog_id));
        }
        return key;
    }

    /// The key text.
    pub fn as_str(&self) -> &str {
        return &self.0;
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

/// A downloaded cover image persisted to the output sink.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    /// Key the file is stored under.
    pub canonical_key: CanonicalKey,
    /// Where the raw bytes were written.
    pub local_path: PathBuf,
    /// The resolution this image belongs to.
    pub resolution: Resolution,
    /// URL the bytes were downloaded from.
    pub source_url: String,
}
