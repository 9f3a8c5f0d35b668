//! Error taxonomy shared by every public entry point (spec §7).
//!
//! Internal helpers are free to `?`-propagate anything that converts into
//! [`Error`]; the controller is the only layer that is required to catch,
//! log, and convert into a stable return value.

use thiserror::Error;

/// The crate-wide error type. Variants are grouped by cause, not by the
/// Rust type that produced them, matching the taxonomy in spec §7.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("invalid data type: {0}")]
    InvalidDataType(String),

    #[error("feature not found: {0}")]
    FeatureNotFound(String),

    #[error("rule not matched")]
    RuleNotMatched,

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("not supported yet: {0}")]
    NotSupportedYet(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidParameter(format!("json: {e}"))
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::InvalidParameter(format!("csv: {e}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::InternalError(format!("io: {e}"))
    }
}

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::InternalError(msg.into())
    }
}
