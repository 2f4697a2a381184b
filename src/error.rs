//! Crate-level fatal error types. Item-scoped failures live with the stage that produces them.

use std::path::PathBuf;

/// Errors that abort a whole run. Each variant names the file, value, or reason
/// for failure so the diagnostic is useful without a debugger.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An explicitly requested config file does not exist on disk.
    #[error("config not found: {}", path.display())]
    ConfigNotFound {
        /// Path to the missing config file.
        path: PathBuf,
    },

    /// The config file parsed but holds a value the pipeline cannot use.
    #[error("invalid config value `{key}`: {reason}")]
    ConfigValue {
        /// Config key holding the bad value.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("http client: {reason}")]
    HttpClient {
        /// Description of the builder failure.
        reason: String,
    },

    /// The input list of game names does not exist.
    #[error("input not found: {}", path.display())]
    InputNotFound {
        /// Path to the missing input file.
        path: PathBuf,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// The configured log file cannot be opened.
    #[error("log file not writable: {}: {reason}", path.display())]
    LogFile {
        /// Configured `log_file` path.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The output directory cannot be created or written to.
    #[error("output not writable: {}: {reason}", path.display())]
    OutputNotWritable {
        /// Output directory that that could not be created or written.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// A run summary exists but cannot be trusted.
    #[error("summary corrupt: {reason}")]
    SummaryCorrupt {
        /// Description of the corruption.
        reason: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// TOML serialization failed.
    #[error("toml serialize: {0}")]
    TomlSer(
        /// The wrapped TOML serialization error.
        #[from]
        toml::ser::Error,
    ),

    /// The download worker pool could not be started.
    #[error("worker pool: {reason}")]
    WorkerPool {
        /// Description of the thread pool failure.
        reason: String,
    },
}
