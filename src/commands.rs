//! CLI commands for gamethumb: run, resolve, normalize, key.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{info, warn};

use crate::bgg::BggCatalog;
use crate::config::Config;
use crate::diagnostics;
use crate::error::Error;
use crate::http::HttpClient;
use crate::input;
use crate::normalizer;
use crate::pipeline::{CancelToken, Pipeline};
use crate::ratelimit::RateGate;
use crate::resolver::{NameResolver, ResolutionFailure};
use crate::sink::{self, IMAGE_EXT, OutputSink};
use crate::types::{CanonicalKey, Query};

/// Command-line flags that override config values. `resolve` uses only the catalog ones.
#[derive(Debug, Default)]
pub struct RunOverrides {
    /// Catalog API root.
    pub base_url: Option<String>,
    /// Minimum spacing between catalog requests, in milliseconds.
    pub interval_ms: Option<u64>,
    /// Keep raw downloads.
    pub keep_originals: bool,
    /// Output root.
    pub output: Option<PathBuf>,
    /// Download and decode workers.
    pub workers: Option<usize>,
}

impl RunOverrides {
    /// Apply the flags that were given on top of `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigValue` if an override is out of range.
    pub fn apply(self, config: &mut Config) -> Result<(), Error> {
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(ms) = self.interval_ms {
            config.min_interval = std::time::Duration::from_millis(ms);
        }
        if self.keep_originals {
            config.keep_originals = true;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(workers) = self.workers {
            config.fetch_workers = workers;
        }
        return config.validate();
    }
}

/// One line of `gamethumb resolve --json`.
#[derive(Debug, serde::Serialize)]
struct ResolveLine<'a> {
    /// Canonical name when resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    canonical_name: Option<&'a str>,
    /// Catalog id when resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog_id: Option<u64>,
    /// The query as given.
    query: &'a str,
    /// Failure cause for transient results.
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    /// `exact`, `guessed`, `unresolved`, or `transient`.
    status: &'static str,
}

/// Resolve, download, and normalize every game listed in `input_path`.
///
/// # Errors
///
/// Returns `Error::InputNotFound` if the list is missing,
/// `Error::OutputNotWritable` if the output root cannot be used,
/// or any other fatal setup error. Per-game failures only affect the exit code.
pub fn run(input_path: &Path, overrides: RunOverrides, mut config: Config) -> Result<ExitCode, Error> {
    overrides.apply(&mut config)?;
    let queries = input::read_queries(input_path)?;
    let sink = OutputSink::open(&config.output_dir, &config.review_dir)?;
    let http = HttpClient::new(&config)?;
    let gate = RateGate::new(config.min_interval);
    let catalog = BggCatalog::new(&config.base_url, config.rank_batch_size, &gate, &http);

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);

    info!(
        input = %input_path.display(),
        queries = queries.len(),
        output = %config.output_dir.display(),
        interval = ?config.min_interval,
        "starting run"
    );
    let pipeline = Pipeline::new(&catalog, &http, &sink, &config, cancel)?;
    let report = pipeline.run(&queries)?;

    for saved in &report.saved {
        println!("SAVED       {}", saved.path.display());
    }
    for saved in &report.review {
        println!("REVIEW      {}  ({} -> {})", saved.path.display(), saved.query, saved.name);
    }
    for failure in &report.unresolved {
        println!("UNRESOLVED  {}", failure.query);
    }
    for failure in &report.unfetchable {
        println!("UNFETCHABLE {}  ({})", failure.name.as_deref().unwrap_or(&failure.query), failure.reason);
    }
    for failure in &report.transient {
        println!("TRANSIENT   {}  ({})", failure.query, failure.reason);
    }
    for query in &report.skipped {
        println!("SKIPPED     {query}");
    }
    diagnostics::print_run_report(&report, &config.output_dir);

    return Ok(ExitCode::from(report.exit_code()));
}

/// Cancel `token` on Ctrl-C. The run stops at the next item boundary.
fn install_interrupt_handler(token: &CancelToken) {
    let token = token.clone();
    let installed = ctrlc::set_handler(move || {
        if !token.is_cancelled() {
            eprintln!("interrupted: finishing the current item, skipping the rest");
        }
        token.cancel();
    });
    if let Err(e) = installed {
        warn!(error = %e, "cannot install Ctrl-C handler; interrupting will abort mid-item");
    }
}

/// Resolve names against the catalog without downloading anything.
///
/// # Errors
///
/// Returns `Error::ConfigValue` for an out-of-range override, or another
/// fatal setup error. Per-name failures only set the exit code.
pub fn resolve(names: &[String], json: bool, overrides: RunOverrides, mut config: Config) -> Result<ExitCode, Error> {
    overrides.apply(&mut config)?;
    let http = HttpClient::new(&config)?;
    let gate = RateGate::new(config.min_interval);
    let catalog = BggCatalog::new(&config.base_url, config.rank_batch_size, &gate, &http);
    let resolver = NameResolver::new(&catalog);

    let mut unresolved = 0_u32;
    let mut transient = 0_u32;
    for query in names.iter().filter_map(|n| return Query::parse(n)) {
        let outcome = resolver.resolve(&query);
        let line = match &outcome {
            Ok(r) => ResolveLine {
                canonical_name: Some(&r.canonical_name),
                catalog_id: Some(r.catalog_id),
                query: query.as_str(),
                reason: None,
                status: if r.was_guessed { "guessed" } else { "exact" },
            },
            Err(ResolutionFailure::Unresolved { .. }) => {
                unresolved = unresolved.saturating_add(1);
                ResolveLine { canonical_name: None, catalog_id: None, query: query.as_str(), reason: None, status: "unresolved" }
            },
            Err(ResolutionFailure::Transient { reason, .. }) => {
                transient = transient.saturating_add(1);
                ResolveLine {
                    canonical_name: None,
                    catalog_id: None,
                    query: query.as_str(),
                    reason: Some(reason),
                    status: "transient",
                }
            },
        };
        print_resolve_line(&line, json);
    }

    // Exit code priority: transient (3) > unresolved (2) > resolved (0).
    if transient > 0 {
        return Ok(ExitCode::from(3));
    } else if unresolved > 0 {
        return Ok(ExitCode::from(2));
    } else {
        return Ok(ExitCode::SUCCESS);
    }
}

/// Print one resolve result as a JSON line or a fixed-width text row.
fn print_resolve_line(line: &ResolveLine<'_>, json: bool) {
    if json {
        match serde_json::to_string(line) {
            Ok(s) => println!("{s}"),
            Err(e) => warn!(error = %e, "cannot serialize resolve line"),
        }
        return;
    }
    match (line.catalog_id, line.canonical_name) {
        (Some(id), Some(name)) => println!("{:<10} {id:>8}  {name}  ({})", line.status, line.query),
        _ => match line.reason {
            Some(reason) => println!("{:<10} {:>8}  {}  ({reason})", line.status, "-", line.query),
            None => println!("{:<10} {:>8}  {}", line.status, "-", line.query),
        },
    }
    return;
}

/// Normalize local image files into square PNGs. No network access.
///
/// Each `<stem>.png` is written next to its source, or into `output` when given.
///
/// # Errors
///
/// Returns `Error::OutputNotWritable` if `output` cannot be used.
/// Unreadable or corrupt files are reported per file and set exit code 2.
pub fn normalize(files: &[PathBuf], output: Option<&Path>, config: &Config) -> Result<ExitCode, Error> {
    if let Some(dir) = output {
        OutputSink::open(dir, &config.review_dir)?;
    }

    let mut failed = 0_u32;
    for file in files {
        match normalize_file(file, output, config.canvas_max) {
            Ok(written) => println!("NORMALIZED  {} -> {}", file.display(), written.display()),
            Err(reason) => {
                failed = failed.saturating_add(1);
                println!("FAILED      {}  ({reason})", file.display());
            },
        }
    }

    if failed > 0 {
        return Ok(ExitCode::from(2));
    }
    return Ok(ExitCode::SUCCESS);
}

/// Normalize one file and return the path written.
fn normalize_file(file: &Path, output: Option<&Path>, canvas_max: u32) -> Result<PathBuf, String> {
    let bytes = std::fs::read(file).map_err(|e| return e.to_string())?;
    let png = normalizer::normalize(&bytes, canvas_max).map_err(|e| return e.to_string())?;

    let stem = file.file_stem().ok_or_else(|| return "no file name".to_string())?;
    let dir = output.or_else(|| return file.parent()).unwrap_or(Path::new(""));
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(IMAGE_EXT);
    let target = dir.join(name);

    sink::write_atomic(&target, &png).map_err(|e| return format!("{}: {e}", target.display()))?;
    return Ok(target);
}

/// Print the canonical key of each name.
pub fn key(names: &[String]) -> ExitCode {
    for name in names {
        println!("{}", CanonicalKey::from_name(name));
    }
    return ExitCode::SUCCESS;
}
