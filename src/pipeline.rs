//! Three-stage run: resolve → fetch → normalize.
//!
//! Each stage drains its whole input before the next one starts. A failed
//! item is recorded in its bucket and appended to the matching report file;
//! it never stops the batch. Network downloads and image decoding run on a
//! bounded worker pool, but everything that writes to disk runs in input
//! order so key collisions resolve last-write-wins.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::Error;
use crate::fetcher::{Download, FetchFailure, Fetcher};
use crate::http::HttpClient;
use crate::normalizer::{self, NormalizeError};
use crate::report::{ReportFiles, ReportKind, SUMMARY_FILE, Summary, SummaryEntry};
use crate::resolver::{NameResolver, ResolutionFailure};
use crate::sink::OutputSink;
use crate::types::{CanonicalKey, CatalogId, ImageAsset, Query, Resolution};

/// Shared stop flag, checked before each item in each stage.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        return Self::default();
    }

    /// Ask the run to stop at the next item boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        return self.0.load(Ordering::SeqCst);
    }
}

/// A normalized image written to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    /// Catalog identifier.
    pub catalog_id: CatalogId,
    /// Canonical key the file is named by.
    pub key: CanonicalKey,
    /// Canonical name from the catalog.
    pub name: String,
    /// Path relative to the output root.
    pub path: PathBuf,
    /// The user query that led here.
    pub query: String,
}

/// An item that ended without a saved image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Canonical name, once resolution succeeded.
    pub name: Option<String>,
    /// The user query.
    pub query: String,
    /// Human-readable cause.
    pub reason: String,
    /// Whether a rerun may succeed: the catalog was unavailable, not wrong.
    pub retryable: bool,
}

/// Outcome buckets for one run, appended to as items finish.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Guessed resolutions, saved in the review bucket.
    pub review: Vec<SavedImage>,
    /// Exact resolutions, saved in the primary bucket.
    pub saved: Vec<SavedImage>,
    /// Queries never processed because the run was cancelled.
    pub skipped: Vec<String>,
    /// Queries the catalog could not answer this time.
    pub transient: Vec<Failure>,
    /// Resolved entries with no usable image.
    pub unfetchable: Vec<Failure>,
    /// Queries with no matching game.
    pub unresolved: Vec<Failure>,
}

impl RunReport {
    /// Process exit code: 0 all saved, 2 some item failed for good,
    /// 3 some item may succeed on a rerun.
    pub fn exit_code(&self) -> u8 {
        if self.needs_rerun() {
            return 3;
        }
        if !self.unresolved.is_empty() || !self.unfetchable.is_empty() {
            return 2;
        }
        return 0;
    }

    /// Whether some item may succeed on a rerun: transient, skipped, or
    /// unfetchable because the catalog was down at fetch time.
    pub fn needs_rerun(&self) -> bool {
        return !self.transient.is_empty()
            || !self.skipped.is_empty()
            || self.unfetchable.iter().any(|f| return f.retryable);
    }

    /// Summary entries for every saved image, per bucket in processing order.
    pub fn summary_entries(&self) -> Vec<SummaryEntry> {
        let exact = self.saved.iter().map(|s| return (s, false));
        let guessed = self.review.iter().map(|s| return (s, true));
        return exact
            .chain(guessed)
            .map(|(s, guessed)| {
                return SummaryEntry {
                    catalog_id: s.catalog_id,
                    guessed,
                    key: s.key.clone(),
                    name: s.name.clone(),
                    path: s.path.clone(),
                };
            })
            .collect();
    }
}

/// Runs the three stages over one input list.
pub struct Pipeline<'a, C: Catalog + Sync> {
    /// Stop flag.
    cancel: CancelToken,
    /// Largest canvas side.
    canvas_max: u32,
    /// Stage 2.
    fetcher: Fetcher<'a, C>,
    /// Keep raw downloads after normalization.
    keep_originals: bool,
    /// Workers for downloads and decoding.
    pool: rayon::ThreadPool,
    /// Append-only side files.
    reports: ReportFiles,
    /// Stage 1.
    resolver: NameResolver<'a, C>,
    /// Output root.
    sink: &'a OutputSink,
}

impl<'a, C: Catalog + Sync> Pipeline<'a, C> {
    /// Wire the stages together.
    ///
    /// # Errors
    ///
    /// Returns `Error::WorkerPool` if the worker threads cannot be started.
    pub fn new(
        catalog: &'a C,
        http: &'a HttpClient,
        sink: &'a OutputSink,
        config: &Config,
        cancel: CancelToken,
    ) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.fetch_workers)
            .thread_name(|i| return format!("gamethumb-worker-{i}"))
            .build()
            .map_err(|e| return Error::WorkerPool { reason: e.to_string() })?;
        return Ok(Self {
            cancel,
            canvas_max: config.canvas_max,
            fetcher: Fetcher::new(catalog, http, sink),
            keep_originals: config.keep_originals,
            pool,
            reports: ReportFiles::new(sink.root()),
            resolver: NameResolver::new(catalog),
            sink,
        });
    }

    /// Process every query and write `summary.toml`.
    ///
    /// # Errors
    ///
    /// Returns `Error::SummaryCorrupt` or `Error::TomlDe` before any work if
    /// the previous summary cannot be trusted, and `Error::TomlSer` or
    /// `Error::Io` if the new one cannot be written. Item failures are never
    /// errors; they land in the returned report.
    pub fn run(&self, queries: &[Query]) -> Result<RunReport, Error> {
        let summary_path = self.sink.root().join(SUMMARY_FILE);
        let previous = read_previous_summary(&summary_path)?;
        let mut report = RunReport::default();

        info!(count = queries.len(), "resolving");
        let resolutions = self.resolve_all(queries, &mut report);

        info!(count = resolutions.len(), workers = self.pool.current_num_threads(), "fetching");
        let assets = self.fetch_all(&resolutions, &mut report);

        info!(count = assets.len(), "normalizing");
        self.normalize_all(&assets, &mut report);

        self.sink.remove_empty_originals();
        let mut entries: Vec<SummaryEntry> = previous
            .into_iter()
            .filter(|e| return self.sink.root().join(&e.path).is_file())
            .collect();
        entries.extend(report.summary_entries());
        Summary::new(entries).write(&summary_path)?;

        info!(
            saved = report.saved.len(),
            review = report.review.len(),
            unresolved = report.unresolved.len(),
            transient = report.transient.len(),
            unfetchable = report.unfetchable.len(),
            skipped = report.skipped.len(),
            "run complete"
        );
        return Ok(report);
    }

    // ── Stage 1: resolve ───────────────────────────────────────────────

    /// Resolve queries one at a time; every call shares the rate gate.
    fn resolve_all(&self, queries: &[Query], report: &mut RunReport) -> Vec<Resolution> {
        let mut resolutions = Vec::with_capacity(queries.len());
        for query in queries {
            if self.cancel.is_cancelled() {
                report.skipped.push(query.as_str().to_string());
                continue;
            }
            match self.resolver.resolve(query) {
                Ok(resolution) => resolutions.push(resolution),
                Err(ResolutionFailure::Unresolved { query }) => {
                    self.append(ReportKind::Unresolved, &[&query]);
                    report.unresolved.push(Failure {
                        name: None,
                        query,
                        reason: "no matching game".to_string(),
                        retryable: false,
                    });
                },
                Err(ResolutionFailure::Transient { query, reason }) => {
                    self.append(ReportKind::Transient, &[&query, &reason]);
                    report.transient.push(Failure { name: None, query, reason, retryable: true });
                },
            }
        }
        return resolutions;
    }

    // ── Stage 2: fetch ─────────────────────────────────────────────────

    /// Download in parallel, then persist in input order.
    fn fetch_all(&self, resolutions: &[Resolution], report: &mut RunReport) -> Vec<ImageAsset> {
        let downloads: Vec<Option<Result<Download, FetchFailure>>> = self.pool.install(|| {
            return resolutions
                .par_iter()
                .map(|resolution| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    return Some(self.fetcher.download(resolution));
                })
                .collect();
        });

        let mut assets = Vec::with_capacity(resolutions.len());
        for (resolution, download) in resolutions.iter().zip(downloads) {
            let outcome = match download {
                Some(_) if self.cancel.is_cancelled() => None,
                other => other,
            };
            match outcome.map(|d| return d.and_then(|d| return self.fetcher.persist(d))) {
                None => report.skipped.push(resolution.query.clone()),
                Some(Ok(asset)) => assets.push(asset),
                Some(Err(failure)) => {
                    let retryable = matches!(failure, FetchFailure::Transient { .. });
                    self.record_unfetchable(resolution, &failure.to_string(), retryable, report);
                },
            }
        }
        return assets;
    }

    // ── Stage 3: normalize ─────────────────────────────────────────────

    /// Decode and normalize in parallel, then write in input order.
    fn normalize_all(&self, assets: &[ImageAsset], report: &mut RunReport) {
        let normalized: Vec<Option<Result<Vec<u8>, String>>> = self.pool.install(|| {
            return assets
                .par_iter()
                .map(|asset| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    return Some(self.normalize_asset(asset));
                })
                .collect();
        });

        for (asset, result) in assets.iter().zip(normalized) {
            let result = match result {
                Some(_) if self.cancel.is_cancelled() => None,
                other => other,
            };
            match result {
                None => report.skipped.push(asset.resolution.query.clone()),
                Some(Err(reason)) => self.record_unfetchable(&asset.resolution, &reason, false, report),
                Some(Ok(png)) => self.save(asset, &png, report),
            }
        }
    }

    /// Read the raw download and normalize it.
    fn normalize_asset(&self, asset: &ImageAsset) -> Result<Vec<u8>, String> {
        let bytes = std::fs::read(&asset.local_path)
            .map_err(|e| return format!("cannot read {}: {e}", asset.local_path.display()))?;
        return normalizer::normalize(&bytes, self.canvas_max).map_err(|e: NormalizeError| return e.to_string());
    }

    /// Write the normalized image and drop the raw download.
    fn save(&self, asset: &ImageAsset, png: &[u8], report: &mut RunReport) {
        let resolution = &asset.resolution;
        let path = self.sink.image_path(&asset.canonical_key, resolution.was_guessed);
        if let Err(e) = self.sink.write(&path, png) {
            let reason = format!("write failed: {}: {e}", path.display());
            self.record_unfetchable(resolution, &reason, false, report);
            return;
        }

        if !self.keep_originals
            && let Err(e) = std::fs::remove_file(&asset.local_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %asset.local_path.display(), error = %e, "cannot remove raw download");
        }

        let relative = path.strip_prefix(self.sink.root()).map_or_else(|_| return path.clone(), PathBuf::from);
        info!(
            key = %asset.canonical_key,
            guessed = resolution.was_guessed,
            path = %relative.display(),
            source = %asset.source_url,
            "saved"
        );
        let saved = SavedImage {
            catalog_id: resolution.catalog_id,
            key: asset.canonical_key.clone(),
            name: resolution.canonical_name.clone(),
            path: relative,
            query: resolution.query.clone(),
        };
        if resolution.was_guessed {
            report.review.push(saved);
        } else {
            report.saved.push(saved);
        }
    }

    /// Record an item that resolved but produced no image.
    fn record_unfetchable(&self, resolution: &Resolution, reason: &str, retryable: bool, report: &mut RunReport) {
        info!(name = %resolution.canonical_name, reason, retryable, "unfetchable");
        self.append(ReportKind::Unfetchable, &[&resolution.canonical_name, reason]);
        report.unfetchable.push(Failure {
            name: Some(resolution.canonical_name.clone()),
            query: resolution.query.clone(),
            reason: reason.to_string(),
            retryable,
        });
    }

    /// Append to a report file. A failed append is logged; the in-memory report still has the item.
    fn append(&self, kind: ReportKind, fields: &[&str]) {
        if let Err(e) = self.reports.append(kind, fields) {
            error!(file = kind.file_name(), error = %e, "cannot append report line");
        }
    }
}

/// Entries of an earlier run's summary; none if there is no summary yet.
///
/// # Errors
///
/// Returns `Error::SummaryCorrupt` or `Error::TomlDe` for an unreadable
/// summary, or `Error::Io` if it cannot be read.
fn read_previous_summary(path: &std::path::Path) -> Result<Vec<SummaryEntry>, Error> {
    return match Summary::read(path) {
        Ok(summary) => Ok(summary.entries),
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    };
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::Path;

    use httpmock::prelude::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    use super::*;
    use crate::catalog::fake::FakeCatalog;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 120, 90])));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        return out.into_inner();
    }

    fn config() -> Config {
        return Config { fetch_workers: 2, max_retries: 0, ..Config::default() };
    }

    struct Harness {
        dir: tempfile::TempDir,
        http: HttpClient,
        sink: OutputSink,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let sink = OutputSink::open(&dir.path().join("game_images"), Path::new("review")).unwrap();
            return Self { dir, http: HttpClient::new(&config()).unwrap(), sink };
        }

        fn run(&self, catalog: &FakeCatalog, config: &Config, cancel: CancelToken, names: &[&str]) -> RunReport {
            let queries: Vec<Query> = names.iter().filter_map(|n| return Query::parse(n)).collect();
            let pipeline = Pipeline::new(catalog, &self.http, &self.sink, config, cancel).unwrap();
            return pipeline.run(&queries).unwrap();
        }

        fn root(&self) -> PathBuf {
            return self.dir.path().join("game_images");
        }
    }

    #[test]
    fn exact_match_lands_in_primary_bucket() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/catan.jpg");
            then.status(200).body(png(1200, 800));
        });
        let url = server.url("/catan.jpg");
        let catalog = FakeCatalog::new().entry(13, "CATAN", Some(url.as_str()), Some(100)).exact("Catan", 13);
        let harness = Harness::new();

        let report = harness.run(&catalog, &config(), CancelToken::new(), &["Catan"]);

        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.saved.len(), 1);
        assert!(report.review.is_empty() && report.unresolved.is_empty());
        let out = image::open(harness.root().join("catan.png")).unwrap();
        assert_eq!((out.width(), out.height()), (500, 500));
        assert!(!harness.root().join("review").join("catan.png").exists());
        assert!(!harness.root().join("originals").exists());
        assert!(!harness.root().join("unresolved.txt").exists());
    }

    #[test]
    fn guessed_match_lands_in_review_bucket() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/caverna.png");
            then.status(200).body(png(300, 200));
        });
        let url = server.url("/caverna.png");
        let catalog = FakeCatalog::new()
            .entry(1, "Caverna: The Cave Farmers", Some(url.as_str()), Some(9000))
            .entry(2, "Caverna: The Forgotten Folk", None, Some(40))
            .search_hits("Caverna", &[1, 2]);
        let harness = Harness::new();

        let report = harness.run(&catalog, &config(), CancelToken::new(), &["Caverna"]);

        assert_eq!(report.review.len(), 1);
        assert_eq!(report.review[0].catalog_id, 1);
        assert_eq!(report.review[0].path, Path::new("review").join("caverna_the_cave_farmers.png"));
        assert!(harness.root().join("review").join("caverna_the_cave_farmers.png").exists());
        assert!(!harness.root().join("caverna_the_cave_farmers.png").exists());

        let summary = Summary::read(&harness.root().join(SUMMARY_FILE)).unwrap();
        assert_eq!(summary.entries.len(), 1);
        assert!(summary.entries[0].guessed);
    }

    #[test]
    fn unmatched_query_is_reported_verbatim() {
        let catalog = FakeCatalog::new();
        let harness = Harness::new();

        let report = harness.run(&catalog, &config(), CancelToken::new(), &["Xyzzyplugh12345"]);

        assert_eq!(report.exit_code(), 2);
        assert_eq!(report.unresolved.len(), 1);
        let listed = std::fs::read_to_string(harness.root().join("unresolved.txt")).unwrap();
        assert_eq!(listed, "Xyzzyplugh12345\n");
        let pngs = std::fs::read_dir(harness.root())
            .unwrap()
            .filter(|e| return e.as_ref().unwrap().path().extension().is_some_and(|x| return x == "png"))
            .count();
        assert_eq!(pngs, 0);
    }

    #[test]
    fn one_failure_does_not_stop_the_batch() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/good.png");
            then.status(200).body(png(64, 64));
        });
        server.mock(|when, then| {
            when.method(GET).path("/broken.png");
            then.status(200).body("<html>oops</html>");
        });
        let good = server.url("/good.png");
        let broken = server.url("/broken.png");
        let catalog = FakeCatalog::new()
            .entry(1, "Azul", Some(good.as_str()), Some(1))
            .entry(2, "Broken", Some(broken.as_str()), Some(1))
            .entry(3, "No Art", None, Some(1))
            .exact("Broken", 2)
            .exact("No Art", 3)
            .exact("Azul", 1);
        let harness = Harness::new();

        let report = harness.run(&catalog, &config(), CancelToken::new(), &["Broken", "No Art", "Nothing", "Azul"]);

        assert_eq!(report.saved.len(), 1);
        assert_eq!(report.saved[0].name, "Azul");
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unfetchable.len(), 2);
        // fetch-stage failures are recorded before normalize-stage ones
        assert_eq!(report.unfetchable[0].name.as_deref(), Some("No Art"));
        assert!(report.unfetchable[1].reason.starts_with("corrupt image"));
        assert_eq!(report.exit_code(), 2);

        let unfetchable = std::fs::read_to_string(harness.root().join("unfetchable.txt")).unwrap();
        assert_eq!(unfetchable.lines().count(), 2);
        assert!(unfetchable.contains("No Art\tcatalog entry has no image"));
    }

    #[test]
    fn key_collision_keeps_the_last_entry() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/first.png");
            then.status(200).body(png(10, 20));
        });
        server.mock(|when, then| {
            when.method(GET).path("/second.png");
            then.status(200).body(png(30, 20));
        });
        let first = server.url("/first.png");
        let second = server.url("/second.png");
        let catalog = FakeCatalog::new()
            .entry(1, "Dune!", Some(first.as_str()), Some(1))
            .entry(2, "Dune", Some(second.as_str()), Some(1))
            .exact("Dune 1965", 1)
            .exact("Dune 2019", 2);
        let harness = Harness::new();

        let report = harness.run(&catalog, &config(), CancelToken::new(), &["Dune 1965", "Dune 2019"]);

        assert_eq!(report.saved.len(), 2);
        let out = image::open(harness.root().join("dune.png")).unwrap();
        assert_eq!((out.width(), out.height()), (30, 30));
        let summary = Summary::read(&harness.root().join(SUMMARY_FILE)).unwrap();
        assert_eq!(summary.entries.len(), 1);
        assert_eq!(summary.entries[0].catalog_id, 2);
    }

    #[test]
    fn offline_catalog_is_transient_not_unresolved() {
        let catalog = FakeCatalog::new().offline();
        let harness = Harness::new();

        let report = harness.run(&catalog, &config(), CancelToken::new(), &["Catan"]);

        assert!(report.unresolved.is_empty());
        assert_eq!(report.transient.len(), 1);
        assert_eq!(report.exit_code(), 3);
        let listed = std::fs::read_to_string(harness.root().join("transient.txt")).unwrap();
        assert!(listed.starts_with("Catan\t"));
    }

    #[test]
    fn keep_originals_leaves_raw_download() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/azul.png");
            then.status(200).body(png(8, 8));
        });
        let url = server.url("/azul.png");
        let catalog = FakeCatalog::new().entry(1, "Azul", Some(url.as_str()), Some(1)).exact("Azul", 1);
        let harness = Harness::new();
        let config = Config { keep_originals: true, ..config() };

        harness.run(&catalog, &config, CancelToken::new(), &["Azul"]);

        assert!(harness.root().join("originals").join("azul.png").exists());
        assert!(harness.root().join("azul.png").exists());
    }

    #[test]
    fn summary_accumulates_across_runs() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/img.png");
            then.status(200).body(png(16, 16));
        });
        let url = server.url("/img.png");
        let catalog = FakeCatalog::new()
            .entry(1, "Azul", Some(url.as_str()), Some(1))
            .entry(13, "CATAN", Some(url.as_str()), Some(1))
            .exact("Azul", 1)
            .exact("Catan", 13);
        let harness = Harness::new();

        harness.run(&catalog, &config(), CancelToken::new(), &["Catan"]);
        harness.run(&catalog, &config(), CancelToken::new(), &["Azul"]);

        let summary = Summary::read(&harness.root().join(SUMMARY_FILE)).unwrap();
        let keys: Vec<&str> = summary.entries.iter().map(|e| return e.key.as_str()).collect();
        assert_eq!(keys, ["azul", "catan"]);
    }

    #[test]
    fn corrupt_summary_stops_the_run_before_any_request() {
        let catalog = FakeCatalog::new().offline();
        let harness = Harness::new();
        std::fs::write(harness.root().join(SUMMARY_FILE), "entries = 7\n").unwrap();

        let pipeline = Pipeline::new(&catalog, &harness.http, &harness.sink, &config(), CancelToken::new()).unwrap();
        let queries = [Query::parse("Catan").unwrap()];
        assert!(pipeline.run(&queries).is_err());
        assert!(!harness.root().join("transient.txt").exists());
    }

    #[test]
    fn catalog_outage_at_fetch_time_asks_for_a_rerun() {
        let catalog = FakeCatalog::new()
            .entry(13, "CATAN", Some("http://127.0.0.1:9/catan.png"), Some(1))
            .exact("Catan", 13)
            .unavailable_entry(13);
        let harness = Harness::new();

        let report = harness.run(&catalog, &config(), CancelToken::new(), &["Catan"]);

        assert!(report.transient.is_empty());
        assert_eq!(report.unfetchable.len(), 1);
        assert!(report.unfetchable[0].retryable);
        assert!(report.unfetchable[0].reason.starts_with("catalog unavailable"));
        assert_eq!(report.exit_code(), 3);
    }

    #[test]
    fn missing_image_is_not_retryable() {
        let catalog = FakeCatalog::new().entry(3, "No Art", None, Some(1)).exact("No Art", 3);
        let harness = Harness::new();

        let report = harness.run(&catalog, &config(), CancelToken::new(), &["No Art"]);

        assert!(!report.unfetchable[0].retryable);
        assert_eq!(report.exit_code(), 2);
    }

    #[test]
    fn cancel_mid_run_keeps_finished_output_and_skips_the_rest() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/img.png");
            then.status(200).body(png(16, 16));
        });
        let url = server.url("/img.png");
        let cancel = CancelToken::new();
        let hook = cancel.clone();
        let catalog = FakeCatalog::new()
            .entry(1, "Azul", Some(url.as_str()), Some(1))
            .entry(13, "CATAN", Some(url.as_str()), Some(1))
            .entry(20, "Dune", Some(url.as_str()), Some(1))
            .exact("Azul", 1)
            .exact("Catan", 13)
            .exact("Dune", 20)
            .after_exact_lookup(move |name| {
                if name == "Azul" {
                    hook.cancel();
                }
            });
        let harness = Harness::new();
        harness.run(&catalog, &config(), CancelToken::new(), &["Catan"]);

        let report = harness.run(&catalog, &config(), cancel, &["Azul", "Catan", "Dune"]);

        // Azul resolved before the stop was seen; it is skipped at the fetch stage.
        assert_eq!(report.skipped, ["Catan", "Dune", "Azul"]);
        assert!(report.saved.is_empty() && report.unfetchable.is_empty());
        assert_eq!(report.exit_code(), 3);
        assert!(harness.root().join("catan.png").exists());
        assert!(!harness.root().join("azul.png").exists());
        assert!(!harness.root().join("originals").exists());
        let summary = Summary::read(&harness.root().join(SUMMARY_FILE)).unwrap();
        let keys: Vec<&str> = summary.entries.iter().map(|e| return e.key.as_str()).collect();
        assert_eq!(keys, ["catan"]);
    }

    #[test]
    fn cancelled_run_skips_everything() {
        let catalog = FakeCatalog::new().entry(13, "CATAN", Some("http://127.0.0.1:9/x.png"), Some(1)).exact("Catan", 13);
        let harness = Harness::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = harness.run(&catalog, &config(), cancel, &["Catan", "Azul"]);

        assert_eq!(report.skipped, ["Catan", "Azul"]);
        assert!(report.saved.is_empty() && report.unresolved.is_empty());
        assert_eq!(report.exit_code(), 3);
        assert!(Summary::read(&harness.root().join(SUMMARY_FILE)).unwrap().entries.is_empty());
    }
}
