//! Reading the list of game names.

use std::path::Path;

use crate::error::Error;
use crate::types::Query;

/// Read one query per line from `path`.
///
/// # Errors
///
/// Returns `Error::InputNotFound` if the file does not exist, or `Error::Io`
/// if it cannot be read or is not UTF-8.
pub fn read_queries(path: &Path) -> Result<Vec<Query>, Error> {
    let content = match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::InputNotFound { path: path.to_path_buf() });
        },
        Err(e) => return Err(Error::Io(e)),
        Ok(c) => c,
    };
    return Ok(parse_queries(&content));
}

/// Split text into queries: lines trimmed, blank lines dropped, order kept.
/// A leading byte-order mark is ignored.
pub fn parse_queries(content: &str) -> Vec<Query> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    return content.lines().filter_map(Query::parse).collect();
}
