//! Name resolution: exact lookup first, popularity-ranked fallback search second.
//!
//! Each query ends in exactly one of four states: resolved exactly, resolved
//! by guess, unresolved, or transient. Transport failures at any step end in
//! `Transient`, never `Unresolved`, so a later run can retry them.

use tracing::{debug, info};

use crate::catalog::{Catalog, CatalogEntry, CatalogError};
use crate::types::{Candidate, Query, Resolution};

/// Why a query produced no resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionFailure {
    /// The catalog could not be reached. Rerunning may succeed.
    #[error("`{query}`: catalog unavailable: {reason}")]
    Transient {
        /// The query as written.
        query: String,
        /// Transport failure description.
        reason: String,
    },
    /// Neither exact lookup nor fallback search found a usable entry.
    #[error("`{query}`: no matching game")]
    Unresolved {
        /// The query as written.
        query: String,
    },
}

impl ResolutionFailure {
    /// The query this failure belongs to.
    pub fn query(&self) -> &str {
        return match self {
            Self::Transient { query, .. } | Self::Unresolved { query } => query,
        };
    }
}

/// Resolves queries against a catalog. Holds no state between queries.
pub struct NameResolver<'a, C: Catalog> {
    /// The catalog service.
    catalog: &'a C,
}

impl<'a, C: Catalog> NameResolver<'a, C> {
    /// Build a resolver over `catalog`.
    pub const fn new(catalog: &'a C) -> Self {
        return Self { catalog };
    }

    /// Resolve one query.
    ///
    /// # Errors
    ///
    /// `ResolutionFailure::Transient` on any transport failure,
    /// `ResolutionFailure::Unresolved` when nothing usable matches.
    pub fn resolve(&self, query: &Query) -> Result<Resolution, ResolutionFailure> {
        match self.catalog.lookup_exact(query.as_str()) {
            Ok(entry) => {
                let resolution = resolution_from(query, &entry, false);
                info!(query = %query, id = resolution.catalog_id, name = %resolution.canonical_name, "exact match");
                return Ok(resolution);
            },
            Err(e) if e.is_transport() => return Err(transient(query, &e)),
            Err(e) => debug!(query = %query, reason = %e, "no exact match, searching"),
        }

        let candidates = self.catalog.search(query.as_str()).map_err(|e| return fallback_failure(query, &e))?;
        if candidates.is_empty() {
            info!(query = %query, "no candidates");
            return Err(unresolved(query));
        }

        let ids: Vec<_> = candidates.iter().map(|c| return c.id).collect();
        let entries = self.catalog.get_entries(&ids).map_err(|e| return fallback_failure(query, &e))?;

        let ranked: Vec<Candidate> = ids
            .iter()
            .map(|&id| {
                let popularity = entries.iter().find(|e| return e.id == id).and_then(|e| return e.popularity);
                return Candidate { catalog_id: id, popularity };
            })
            .collect();
        debug!(query = %query, ?ranked, "ranking candidates");

        let Some(best) = select_most_popular(&ranked) else {
            info!(query = %query, candidates = ranked.len(), "no candidate has a popularity score");
            return Err(unresolved(query));
        };
        let Some(entry) = entries.iter().find(|e| return e.id == best.catalog_id) else {
            return Err(unresolved(query));
        };

        let mut resolution = resolution_from(query, entry, true);
        if resolution.canonical_name.is_empty()
            && let Some(hit) = candidates.iter().find(|c| return c.id == entry.id)
        {
            resolution.canonical_name.clone_from(&hit.name);
        }
        info!(
            query = %query,
            id = resolution.catalog_id,
            name = %resolution.canonical_name,
            popularity = ?best.popularity,
            "guessed match"
        );
        return Ok(resolution);
    }
}

/// Pick the candidate with the highest popularity. Ties go to the first seen;
/// candidates without a score never win. Returns `None` if none has a score.
pub fn select_most_popular(candidates: &[Candidate]) -> Option<&Candidate> {
    let mut best: Option<(&Candidate, u64)> = None;
    for candidate in candidates {
        let Some(score) = candidate.popularity else {
            continue;
        };
        if best.is_none_or(|(_, top)| return score > top) {
            best = Some((candidate, score));
        }
    }
    return best.map(|(candidate, _)| return candidate);
}

/// Build a resolution from a catalog entry. An entry without a primary name keeps the query text.
fn resolution_from(query: &Query, entry: &CatalogEntry, was_guessed: bool) -> Resolution {
    let canonical_name = if entry.name.is_empty() && !was_guessed {
        query.as_str().to_string()
    } else {
        entry.name.clone()
    };
    return Resolution {
        canonical_name,
        catalog_id: entry.id,
        query: query.as_str().to_string(),
        was_guessed,
    };
}

/// Classify a failure during search or ranking.
fn fallback_failure(query: &Query, error: &CatalogError) -> ResolutionFailure {
    if error.is_transport() {
        return transient(query, error);
    }
    info!(query = %query, reason = %error, "search failed");
    return unresolved(query);
}

/// A transient failure for `query`, logged at `info`.
fn transient(query: &Query, error: &CatalogError) -> ResolutionFailure {
    info!(query = %query, reason = %error, "catalog unavailable");
    return ResolutionFailure::Transient {
        query: query.as_str().to_string(),
        reason: error.to_string(),
    };
}

/// An unresolved failure for `query`.
fn unresolved(query: &Query) -> ResolutionFailure {
    return ResolutionFailure::Unresolved { query: query.as_str().to_string() };
}
