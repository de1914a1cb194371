use std::path::PathBuf;

use thiserror::Error;

/// A byte stream that could not be turned into a document tree.
///
/// Fatal to the single load call that produced it; never raised for
/// content-level gaps inside an otherwise well-formed document.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to read session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session payload is not valid gzip: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("session payload is not valid utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("malformed xml: {0}")]
    Xml(String),
    #[error("document has no root element")]
    MissingRoot,
    #[error("unexpected content after root element <{0}>")]
    TrailingContent(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger file {path} is not valid json: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid version pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("failed to persist ledger {path}: {message}")]
    Persist { path: PathBuf, message: String },
}
