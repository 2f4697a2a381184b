//! BoardGameGeek XML API 2 binding of the [`Catalog`] capability.
//!
//! - `lookup_exact` → `search?type=boardgame&exact=1`, then `thing` for the unique hit
//! - `search`       → `search?type=boardgame`
//! - `get_entries`  → `thing?id=a,b,c&stats=1`, batched
//!
//! Popularity is `statistics/ratings/usersrated`, the number of users who
//! rated the game.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesRef, BytesStart, Event};
use tracing::debug;

use crate::catalog::{CandidateRef, Catalog, CatalogEntry, CatalogError};
use crate::http::{HttpClient, HttpError};
use crate::ratelimit::RateGate;
use crate::types::CatalogId;

/// Catalog item type requested from every search.
const ITEM_TYPE: &str = "boardgame";

/// Catalog client bound to one base URL. Every request goes through the shared gate.
pub struct BggCatalog<'a> {
    /// API root, without trailing slash.
    base_url: String,
    /// Maximum ids per `thing` request.
    batch_size: usize,
    /// The run-wide rate gate.
    gate: &'a RateGate,
    /// Shared HTTP client.
    http: &'a HttpClient,
}

impl<'a> BggCatalog<'a> {
    /// Bind a catalog client to `base_url`.
    pub fn new(base_url: &str, batch_size: usize, gate: &'a RateGate, http: &'a HttpClient) -> Self {
        return Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            batch_size: batch_size.max(1),
            gate,
            http,
        };
    }

    /// GET one endpoint and return the body as text.
    ///
    /// # Errors
    ///
    /// `Transport` for transient HTTP failures, `NotFound` for the rest.
    fn request(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<String, CatalogError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let body = self
            .http
            .get(&url, query, Some(self.gate))
            .map_err(|e| return classify_http_error(endpoint, &e))?;
        return Ok(String::from_utf8_lossy(&body).into_owned());
    }

    /// Run a search, exact or loose.
    ///
    /// # Errors
    ///
    /// `Transport` when the service is unavailable or replies with garbage.
    fn run_search(&self, text: &str, exact: bool) -> Result<Vec<CandidateRef>, CatalogError> {
        let mut query = vec![("query", text), ("type", ITEM_TYPE)];
        if exact {
            query.push(("exact", "1"));
        }
        let body = self.request("search", &query)?;
        let candidates = parse_search_results(&body)?;
        debug!(text, exact, hits = candidates.len(), "search");
        return Ok(candidates);
    }
}

impl Catalog for BggCatalog<'_> {
    fn lookup_exact(&self, name: &str) -> Result<CatalogEntry, CatalogError> {
        let hits = self.run_search(name, true)?;
        return match hits.as_slice() {
            [] => Err(CatalogError::NotFound { what: format!("exact name `{name}`") }),
            [only] => self.get_entry(only.id),
            many => Err(CatalogError::Ambiguous {
                count: many.len(),
                name: name.to_string(),
            }),
        };
    }

    fn search(&self, text: &str) -> Result<Vec<CandidateRef>, CatalogError> {
        return self.run_search(text, false);
    }

    fn get_entry(&self, id: CatalogId) -> Result<CatalogEntry, CatalogError> {
        return self
            .get_entries(&[id])?
            .into_iter()
            .find(|e| return e.id == id)
            .ok_or_else(|| return CatalogError::NotFound { what: format!("catalog id {id}") });
    }

    fn get_entries(&self, ids: &[CatalogId]) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut entries = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.batch_size) {
            let joined = chunk.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
            let body = self.request("thing", &[("id", joined.as_str()), ("stats", "1")])?;
            entries.extend(parse_things(&body)?);
        }
        return Ok(entries);
    }
}

/// Tracks an `<error><message>…</message></error>` reply, which BGG sends with status 200.
#[derive(Default)]
struct ServiceErrorScan {
    /// Accumulated message text, whitespace not yet collapsed.
    message: String,
    /// Set once an `<error>` element is seen.
    seen: bool,
}

impl ServiceErrorScan {
    /// Feed an event not consumed by the main parser.
    fn observe(&mut self, event: &Event<'_>) {
        match event {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"error" => self.seen = true,
            Event::Start(_) | Event::End(_) if self.seen => self.message.push(' '),
            Event::Text(t) if self.seen => self.message.push_str(&String::from_utf8_lossy(t)),
            Event::GeneralRef(r) if self.seen => self.message.push_str(&resolve_reference(r)),
            _ => {},
        }
    }

    /// Turn a seen error into a transport failure.
    fn into_result(self) -> Result<(), CatalogError> {
        if !self.seen {
            return Ok(());
        }
        let words: Vec<&str> = self.message.split_whitespace().collect();
        let message = if words.is_empty() { "unspecified error".to_string() } else { words.join(" ") };
        return Err(CatalogError::Transport { reason: format!("catalog replied with error: {message}") });
    }
}

/// Map an HTTP failure onto the catalog's two error classes.
fn classify_http_error(endpoint: &str, error: &HttpError) -> CatalogError {
    if error.is_transient() {
        return CatalogError::Transport { reason: error.to_string() };
    }
    return CatalogError::NotFound { what: format!("{endpoint} ({error})") };
}

// ── XML parsing ────────────────────────────────────────────────────────

/// Parse a `search` response into candidates, in document order, first occurrence of each id kept.
///
/// # Errors
///
/// `Transport` for an `<error>` body or malformed XML.
pub fn parse_search_results(xml: &str) -> Result<Vec<CandidateRef>, CatalogError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut service_error = ServiceErrorScan::default();

    let mut candidates: Vec<CandidateRef> = Vec::new();
    let mut current_id: Option<CatalogId> = None;
    let mut current_name: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"item" => {
                current_id = attribute(e, b"id").and_then(|v| return v.parse().ok());
                current_name = None;
            },
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"item" => {
                if let Some(id) = attribute(e, b"id").and_then(|v| return v.parse().ok())
                    && !candidates.iter().any(|c| return c.id == id)
                {
                    candidates.push(CandidateRef { id, name: String::new() });
                }
            },
            Ok(Event::Empty(ref e) | Event::Start(ref e))
                if current_id.is_some() && e.name().as_ref() == b"name" =>
            {
                let is_primary = attribute(e, b"type").as_deref() == Some("primary");
                if current_name.is_none() || is_primary {
                    current_name = attribute(e, b"value");
                }
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"item" => {
                if let Some(id) = current_id.take()
                    && !candidates.iter().any(|c| return c.id == id)
                {
                    candidates.push(CandidateRef {
                        id,
                        name: current_name.take().unwrap_or_default(),
                    });
                }
            },
            Ok(Event::Eof) => break,
            Ok(ref event) => service_error.observe(event),
            Err(e) => return Err(CatalogError::Transport { reason: format!("malformed search XML: {e}") }),
        }
        buf.clear();
    }

    service_error.into_result()?;
    return Ok(candidates);
}

/// Parse a `thing` response into entries.
///
/// # Errors
///
/// `Transport` for an `<error>` body or malformed XML.
pub fn parse_things(xml: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut service_error = ServiceErrorScan::default();

    let mut entries: Vec<CatalogEntry> = Vec::new();
    let mut current: Option<CatalogEntry> = None;
    // Text of the open `<image>` element. Entities arrive as separate events.
    let mut image_text: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"item" => {
                current = attribute(e, b"id").and_then(|v| return v.parse().ok()).map(|id| {
                    return CatalogEntry {
                        id,
                        image_url: None,
                        name: String::new(),
                        popularity: None,
                    };
                });
            },
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"item" => {
                if let Some(id) = attribute(e, b"id").and_then(|v| return v.parse().ok()) {
                    entries.push(CatalogEntry { id, image_url: None, name: String::new(), popularity: None });
                }
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"item" => {
                if let Some(entry) = current.take() {
                    entries.push(entry);
                }
            },
            Ok(Event::Start(ref e)) if current.is_some() && e.name().as_ref() == b"image" => {
                image_text = Some(String::new());
            },
            Ok(Event::Empty(ref e) | Event::Start(ref e)) if current.is_some() => {
                if let Some(entry) = current.as_mut() {
                    apply_thing_element(entry, e);
                }
            },
            Ok(Event::Text(ref t)) if image_text.is_some() => {
                if let Some(text) = image_text.as_mut() {
                    text.push_str(&String::from_utf8_lossy(t));
                }
            },
            Ok(Event::GeneralRef(ref r)) if image_text.is_some() => {
                if let Some(text) = image_text.as_mut() {
                    text.push_str(&resolve_reference(r));
                }
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"image" => {
                if let (Some(entry), Some(text)) = (current.as_mut(), image_text.take()) {
                    entry.image_url = Some(text.trim().to_string()).filter(|url| return !url.is_empty());
                }
            },
            Ok(Event::Eof) => break,
            Ok(ref event) => service_error.observe(event),
            Err(e) => return Err(CatalogError::Transport { reason: format!("malformed thing XML: {e}") }),
        }
        buf.clear();
    }

    service_error.into_result()?;
    return Ok(entries);
}

/// Fold one attribute-carrying child element of a `thing` item into the entry being built.
fn apply_thing_element(entry: &mut CatalogEntry, element: &BytesStart<'_>) {
    match element.name().as_ref() {
        b"name" => {
            let is_primary = attribute(element, b"type").as_deref() == Some("primary");
            if is_primary || entry.name.is_empty() {
                entry.name = attribute(element, b"value").unwrap_or_default();
            }
        },
        b"usersrated" => {
            entry.popularity = attribute(element, b"value").and_then(|v| return v.trim().parse().ok());
        },
        _ => {},
    }
}

/// Read and unescape one attribute value. A value that fails to unescape is kept as written.
fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    let attr = element.attributes().flatten().find(|a| return a.key.as_ref() == key)?;
    let raw = String::from_utf8_lossy(&attr.value);
    return Some(unescape(&raw).map_or_else(|_| return raw.to_string(), Cow::into_owned));
}

/// Text for one `&name;` or `&#n;` reference in element content. Unknown entities are kept verbatim.
fn resolve_reference(reference: &BytesRef<'_>) -> String {
    if let Ok(Some(c)) = reference.resolve_char_ref() {
        return c.to_string();
    }
    let name = String::from_utf8_lossy(reference);
    return resolve_predefined_entity(&name).map_or_else(|| return format!("&{name};"), str::to_string);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;

    use super::*;
    use crate::config::Config;

    const CAVERNA_SEARCH: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<items total="3" termsofuse="https://boardgamegeek.com/xmlapi/termsofuse">
  <item type="boardgame" id="102794">
    <name type="primary" value="Caverna: The Cave Farmers"/>
    <yearpublished value="2013"/>
  </item>
  <item type="boardgame" id="344258">
    <name type="alternate" value="Caverna: Cave vs Cave"/>
    <name type="primary" value="Caverna: The Forgotten Folk"/>
  </item>
  <item type="boardgame" id="102794">
    <name type="alternate" value="Caverna"/>
  </item>
</items>"#;

    const CATAN_THING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<items termsofuse="https://boardgamegeek.com/xmlapi/termsofuse">
  <item type="boardgame" id="13">
    <thumbnail>https://cf.geekdo-images.com/thumb/pic2419375.jpg</thumbnail>
    <image>https://cf.geekdo-images.com/original/pic2419375.jpg</image>
    <name type="alternate" sortindex="1" value="Die Siedler von Catan"/>
    <name type="primary" sortindex="1" value="CATAN"/>
    <statistics page="1">
      <ratings>
        <usersrated value="123456"/>
        <average value="7.1"/>
      </ratings>
    </statistics>
  </item>
</items>"#;

    fn http() -> HttpClient {
        let config = Config {
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
            ..Config::default()
        };
        return HttpClient::new(&config).unwrap();
    }

    // ── Parsing ────────────────────────────────────────────────────────

    #[test]
    fn search_keeps_document_order_and_drops_duplicate_ids() {
        let candidates = parse_search_results(CAVERNA_SEARCH).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, 102_794);
        assert_eq!(candidates[0].name, "Caverna: The Cave Farmers");
        assert_eq!(candidates[1].id, 344_258);
        assert_eq!(candidates[1].name, "Caverna: The Forgotten Folk");
    }

    #[test]
    fn self_closing_items_are_kept() {
        let xml = r#"<items total="1"><item type="boardgame" id="13"/></items>"#;
        assert_eq!(parse_search_results(xml).unwrap(), vec![CandidateRef { id: 13, name: String::new() }]);
    }

    #[test]
    fn empty_search_is_not_an_error() {
        let xml = r#"<items total="0" termsofuse="x"></items>"#;
        assert!(parse_search_results(xml).unwrap().is_empty());
    }

    #[test]
    fn thing_reads_primary_name_image_and_votes() {
        let entries = parse_things(CATAN_THING).unwrap();
        assert_eq!(
            entries,
            vec![CatalogEntry {
                id: 13,
                image_url: Some("https://cf.geekdo-images.com/original/pic2419375.jpg".to_string()),
                name: "CATAN".to_string(),
                popularity: Some(123_456),
            }]
        );
    }

    #[test]
    fn thing_without_image_or_stats_has_absent_fields() {
        let xml = r#"<items><item type="boardgame" id="7"><name type="primary" value="Bare"/></item></items>"#;
        let entries = parse_things(xml).unwrap();
        assert_eq!(entries[0].image_url, None);
        assert_eq!(entries[0].popularity, None);
    }

    #[test]
    fn names_are_unescaped() {
        let xml = r#"<items><item type="boardgame" id="42"><name type="primary" value="Tigris &amp; Euphrates"/></item></items>"#;
        assert_eq!(parse_things(xml).unwrap()[0].name, "Tigris & Euphrates");
    }

    #[test]
    fn error_body_is_transport() {
        let xml = "<error><message>Rate limit exceeded.</message></error>";
        let err = parse_search_results(xml).unwrap_err();
        assert_eq!(
            err,
            CatalogError::Transport { reason: "catalog replied with error: Rate limit exceeded.".to_string() }
        );
    }

    #[test]
    fn attributes_resolve_numeric_references() {
        let xml = r#"<items><item id="9"><name type="primary" value="Tzolk&#039;in &#x26; more"/></item></items>"#;
        assert_eq!(parse_things(xml).unwrap()[0].name, "Tzolk'in & more");
    }

    #[test]
    fn image_url_keeps_escaped_ampersands() {
        let xml = r#"<items><item id="13"><image>https://cf.example.com/pic.jpg?a=1&amp;b=2&#38;c=3</image></item></items>"#;
        assert_eq!(
            parse_things(xml).unwrap()[0].image_url.as_deref(),
            Some("https://cf.example.com/pic.jpg?a=1&b=2&c=3")
        );
    }

    #[test]
    fn image_url_is_trimmed() {
        let xml = "<items><item id=\"13\"><image>\n  https://cf.example.com/pic.png\n</image></item></items>";
        assert_eq!(parse_things(xml).unwrap()[0].image_url.as_deref(), Some("https://cf.example.com/pic.png"));
    }

    #[test]
    fn error_message_keeps_entities() {
        let err = parse_things("<error>\n  <message>A &amp; B</message>\n</error>").unwrap_err();
        assert_eq!(err, CatalogError::Transport { reason: "catalog replied with error: A & B".to_string() });
    }

    // ── HTTP binding (httpmock) ────────────────────────────────────────

    #[test]
    fn exact_lookup_fetches_the_unique_hit() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/xmlapi2/search")
                .query_param("query", "Catan")
                .query_param("exact", "1");
            then.status(200)
                .body(r#"<items total="1"><item type="boardgame" id="13"><name type="primary" value="CATAN"/></item></items>"#);
        });
        server.mock(|when, then| {
            when.method(GET).path("/xmlapi2/thing").query_param("id", "13").query_param("stats", "1");
            then.status(200).body(CATAN_THING);
        });

        let gate = RateGate::new(Duration::ZERO);
        let http = http();
        let catalog = BggCatalog::new(&server.url("/xmlapi2/"), 20, &gate, &http);
        let entry = catalog.lookup_exact("Catan").unwrap();
        assert_eq!(entry.id, 13);
        assert_eq!(entry.name, "CATAN");
    }

    #[test]
    fn exact_lookup_with_no_hits_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/xmlapi2/search").query_param("exact", "1");
            then.status(200).body(r#"<items total="0"></items>"#);
        });

        let gate = RateGate::new(Duration::ZERO);
        let http = http();
        let catalog = BggCatalog::new(&server.url("/xmlapi2"), 20, &gate, &http);
        let err = catalog.lookup_exact("Caverna").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[test]
    fn exact_lookup_with_several_hits_is_ambiguous() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/xmlapi2/search").query_param("exact", "1");
            then.status(200).body(CAVERNA_SEARCH);
        });

        let gate = RateGate::new(Duration::ZERO);
        let http = http();
        let catalog = BggCatalog::new(&server.url("/xmlapi2"), 20, &gate, &http);
        let err = catalog.lookup_exact("Caverna").unwrap_err();
        assert_eq!(err, CatalogError::Ambiguous { count: 2, name: "Caverna".to_string() });
    }

    #[test]
    fn loose_search_omits_exact_flag() {
        let server = MockServer::start();
        let loose = server.mock(|when, then| {
            when.method(GET)
                .path("/xmlapi2/search")
                .query_param("query", "Caverna")
                .query_param("type", "boardgame")
                .query_param_missing("exact");
            then.status(200).body(CAVERNA_SEARCH);
        });

        let gate = RateGate::new(Duration::ZERO);
        let http = http();
        let catalog = BggCatalog::new(&server.url("/xmlapi2"), 20, &gate, &http);
        assert_eq!(catalog.search("Caverna").unwrap().len(), 2);
        loose.assert_calls(1);
    }

    #[test]
    fn entries_are_fetched_in_batches() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(GET).path("/xmlapi2/thing").query_param("id", "1,2");
            then.status(200).body(
                r#"<items><item id="1"><name type="primary" value="One"/></item><item id="2"><name type="primary" value="Two"/></item></items>"#,
            );
        });
        let second = server.mock(|when, then| {
            when.method(GET).path("/xmlapi2/thing").query_param("id", "3");
            then.status(200).body(r#"<items><item id="3"><name type="primary" value="Three"/></item></items>"#);
        });

        let gate = RateGate::new(Duration::ZERO);
        let http = http();
        let catalog = BggCatalog::new(&server.url("/xmlapi2"), 2, &gate, &http);
        let names: Vec<String> = catalog.get_entries(&[1, 2, 3]).unwrap().into_iter().map(|e| return e.name).collect();
        assert_eq!(names, ["One", "Two", "Three"]);
        first.assert_calls(1);
        second.assert_calls(1);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/xmlapi2/thing");
            then.status(200).body("<items></items>");
        });

        let gate = RateGate::new(Duration::ZERO);
        let http = http();
        let catalog = BggCatalog::new(&server.url("/xmlapi2"), 20, &gate, &http);
        assert!(matches!(catalog.get_entry(999), Err(CatalogError::NotFound { .. })));
    }

    #[test]
    fn every_request_waits_for_the_gate() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/xmlapi2/search").query_param("exact", "1");
            then.status(200).body(r#"<items total="1"><item type="boardgame" id="13"/></items>"#);
        });
        server.mock(|when, then| {
            when.method(GET).path("/xmlapi2/thing").query_param("id", "13");
            then.status(200).body(CATAN_THING);
        });
        let overloaded = server.mock(|when, then| {
            when.method(GET).path("/xmlapi2/thing").query_param("id", "99");
            then.status(503);
        });

        let interval = Duration::from_millis(50);
        let gate = RateGate::new(interval);
        let config = Config { max_retries: 1, retry_backoff: Duration::from_millis(1), ..Config::default() };
        let http = HttpClient::new(&config).unwrap();
        let catalog = BggCatalog::new(&server.url("/xmlapi2"), 20, &gate, &http);

        let start = std::time::Instant::now();
        assert_eq!(catalog.lookup_exact("Catan").unwrap().id, 13);
        assert!(catalog.get_entry(99).unwrap_err().is_transport());
        let elapsed = start.elapsed();

        // search, thing 13, thing 99, and one retry of thing 99
        overloaded.assert_calls(2);
        assert!(elapsed >= interval * 3, "four gated requests took only {elapsed:?}");
    }

    #[test]
    fn server_errors_are_transport() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/xmlapi2/search");
            then.status(502);
        });

        let gate = RateGate::new(Duration::ZERO);
        let http = http();
        let catalog = BggCatalog::new(&server.url("/xmlapi2"), 20, &gate, &http);
        assert!(catalog.search("Catan").unwrap_err().is_transport());
    }
}
