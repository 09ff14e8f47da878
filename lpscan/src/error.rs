//! Error types for the lpscan library.
use thiserror::Error;

/// The primary error type for operations within this library.
///
/// Per-record decode failures are not represented here: they are reported as
/// [`crate::DecodeError`], logged by the pipeline and never abort a run.
#[derive(Error, Debug)]
pub enum LpscanError {
    /// The same tag key was given to more than one filter term.
    #[error("Duplicate filter key '{key}', already have {existing:?}")]
    DuplicateFilterKey { key: String, existing: Vec<String> },

    /// A `key~` term with nothing after the `~`.
    #[error("Prefix filter can not be the empty string: '{0}'")]
    EmptyPrefix(String),

    /// A filter term with nothing before the `=` or `~`.
    #[error("Filter term has an empty key: '{0}'")]
    EmptyFilterKey(String),

    /// A filter list entry that is neither `key=value`, `key=` nor `key~prefix`.
    #[error("'{0}' is not a filter term (expected key=value, key= or key~prefix)")]
    InvalidFilterTerm(String),

    /// The same output column was requested twice.
    #[error("Column '{0}' requested more than once")]
    DuplicateColumn(String),

    /// Reading the run configuration file failed to parse.
    #[error("Invalid run configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Writing delimited output rows failed.
    #[error("Output error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The decode stage of a staged run panicked before finishing.
    #[error("Decode stage terminated abnormally")]
    Staged,
}

/// A convenience type alias for `Result<T, LpscanError>`.
pub type Result<T, E = LpscanError> = std::result::Result<T, E>;
