//! The catalog service seen from the resolver and fetcher: entries, search
//! candidates, and the NotFound/Transport error split.

use crate::types::CatalogId;

/// One catalog entry as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Catalog identifier.
    pub id: CatalogId,
    /// Cover image URL, absent when the entry has no image.
    pub image_url: Option<String>,
    /// Primary (canonical) name.
    pub name: String,
    /// Number of user ratings, absent when the service reports no data.
    pub popularity: Option<u64>,
}

/// A loose search hit: just enough to fetch the full entry later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRef {
    /// Catalog identifier.
    pub id: CatalogId,
    /// Name the search matched on (primary or alternate).
    pub name: String,
}

/// Why a catalog call produced no entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// More than one entry carries exactly this name.
    #[error("`{name}` matches {count} catalog entries")]
    Ambiguous {
        /// Number of exact matches.
        count: usize,
        /// Name that was looked up.
        name: String,
    },
    /// The service has no entry for the request.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },
    /// The service could not answer: timeout, rate limit, 5xx, or a garbled reply.
    #[error("catalog unavailable: {reason}")]
    Transport {
        /// Description of the failure.
        reason: String,
    },
}

impl CatalogError {
    /// Transport-class failures may succeed on a later run; the others are final.
    pub const fn is_transport(&self) -> bool {
        return matches!(self, Self::Transport { .. });
    }
}

/// Catalog capability used by resolution and fetching.
pub trait Catalog {
    /// Find the single entry whose name matches `name` exactly.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Ambiguous` when there is no unique exact match,
    /// `Transport` when the service is unavailable.
    fn lookup_exact(&self, name: &str) -> Result<CatalogEntry, CatalogError>;

    /// Loose free-text search. Candidates come back in service order, without duplicates.
    ///
    /// # Errors
    ///
    /// `Transport` when the service is unavailable.
    fn search(&self, text: &str) -> Result<Vec<CandidateRef>, CatalogError>;

    /// Fetch one entry by id.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Transport` when the service is unavailable.
    fn get_entry(&self, id: CatalogId) -> Result<CatalogEntry, CatalogError>;

    /// Fetch several entries. Ids unknown to the service are left out of the result.
    ///
    /// # Errors
    ///
    /// `Transport` when the service is unavailable.
    fn get_entries(&self, ids: &[CatalogId]) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut entries = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.get_entry(id) {
                Ok(entry) => entries.push(entry),
                Err(e) if e.is_transport() => return Err(e),
                Err(_) => {},
            }
        }
        return Ok(entries);
    }
}
