use std::fmt::Write as _;
use std::path::Path;

use crate::config::CONFIG_FILE;
use crate::error::Error;
use crate::pipeline::RunReport;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    print_markdown(&render_error(e));
}

/// Print the end-of-run report to stderr.
pub fn print_run_report(report: &RunReport, output_dir: &Path) {
    print_markdown(&render_run_report(report, output_dir));
}

/// Print markdown to stderr, headings in bold.
fn print_markdown(md: &str) {
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where there is one,
/// how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::InputNotFound { path } => render_input_not_found(path),
        Error::LogFile { path, reason } => render_log_file(path, reason),
        Error::OutputNotWritable { path, reason } => render_output_not_writable(path, reason),
        Error::ConfigValue { key, reason } => render_config_value(key, reason),
        Error::TomlDe(inner) => render_invalid_toml(&inner.to_string()),
        _ => render_generic(e),
    };
}

/// Short diagnostics for errors without a dedicated renderer.
fn render_generic(e: &Error) -> String {
    return match e {
        Error::ConfigNotFound { path } => format!("\
# Error: Config Not Found

`{}` does not exist.

## Fix

Check the `--config` path, or drop the flag to use `{CONFIG_FILE}` in the
current directory.
", path.display()),

        Error::HttpClient { reason } => format!("\
# Error: HTTP Client

Could not set up the HTTP client: {reason}
"),

        Error::SummaryCorrupt { reason } => format!("\
# Error: Summary Corrupt

{reason}

## Fix

Delete `summary.toml`; the next run writes a fresh one.
"),

        Error::WorkerPool { reason } => format!("\
# Error: Worker Pool

Could not start download workers: {reason}

## Fix

Lower `fetch_workers` in `{CONFIG_FILE}` or pass a smaller `--workers`.
"),

        Error::Io(e) => format!("\
# Error: I/O

{e}
"),
        Error::TomlSer(e) => format!("\
# Error: TOML Serialization

{e}
"),
        // Already handled in render_error, but need exhaustive match.
        _ => format!("\
# Error

{e}
"),
    };
}

/// The game list is missing.
fn render_input_not_found(path: &Path) -> String {
    return format!("\
# Error: Input Not Found

`{}` does not exist.

## Fix

Create it with one game name per line, or name another file:

    gamethumb run path/to/games.txt
", path.display());
}

/// The configured log file cannot be opened.
fn render_log_file(path: &Path, reason: &str) -> String {
    return format!("\
# Error: Log File Not Writable

Cannot open `{}`: {reason}

## Fix

Point `log_file` in `{CONFIG_FILE}` at a writable location, or remove it to
log to stderr only.
", path.display());
}

/// The output root cannot be used.
fn render_output_not_writable(path: &Path, reason: &str) -> String {
    return format!("\
# Error: Output Not Writable

Cannot write to `{}`: {reason}

## Fix

Pick a writable directory:

    gamethumb run --output path/to/images
", path.display());
}

/// A config value is out of range.
fn render_config_value(key: &str, reason: &str) -> String {
    return format!("\
# Error: Invalid Config Value

`{key}` {reason}.

## Fix

Correct `{key}` in `{CONFIG_FILE}`, or remove it to use the default.
");
}

/// The config file is not valid TOML or has unknown keys.
fn render_invalid_toml(message: &str) -> String {
    return format!("\
# Error: Invalid Config

{message}

## Fix

`{CONFIG_FILE}` must be valid TOML using only known keys:

    base_url, canvas_max, fetch_workers, keep_originals, log_file,
    max_retries, min_interval_ms, output_dir, rank_batch_size,
    retry_backoff_ms, review_dir, timeout_secs, user_agent
");
}

/// Render the outcome buckets of a run. Empty buckets are left out.
pub fn render_run_report(report: &RunReport, output_dir: &Path) -> String {
    let mut out = format!("\
# Run Summary

- saved: {}
- review: {}
- unresolved: {}
- unfetchable: {}
- transient: {}
", report.saved.len(), report.review.len(), report.unresolved.len(), report.unfetchable.len(), report.transient.len());
    if !report.skipped.is_empty() {
        let _ = writeln!(out, "- skipped: {}", report.skipped.len());
    }

    if !report.review.is_empty() {
        out.push_str("\n## Review\n\nMatched by popularity, not by exact name. Check these:\n\n");
        for saved in &report.review {
            let _ = writeln!(out, "- `{}` -> {} ({})", saved.query, saved.name, saved.path.display());
        }
    }

    if !report.unresolved.is_empty() {
        out.push_str("\n## Unresolved\n\n");
        for failure in &report.unresolved {
            let _ = writeln!(out, "- `{}`", failure.query);
        }
    }

    if !report.unfetchable.is_empty() {
        out.push_str("\n## Unfetchable\n\n");
        for failure in &report.unfetchable {
            let name = failure.name.as_deref().unwrap_or(&failure.query);
            let _ = writeln!(out, "- {name}: {}", failure.reason);
        }
    }

    if report.needs_rerun() {
        out.push_str("\n## Retry\n\n");
        for failure in report.transient.iter().chain(report.unfetchable.iter().filter(|f| return f.retryable)) {
            let _ = writeln!(out, "- `{}`: {}", failure.query, failure.reason);
        }
        for query in &report.skipped {
            let _ = writeln!(out, "- `{query}`: skipped");
        }
        let _ = writeln!(
            out,
            "\nThe catalog may be rate limiting. Rerun later, or slow down:\n\n    gamethumb run --interval-ms 10000 --output {}",
            output_dir.display()
        );
    }

    return out;
}
