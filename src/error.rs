use thiserror::Error;

/// Document-level failures. Element-level problems are absorbed (logged and
/// skipped) inside the extractors; a "no match" from the classifier or the
/// course resolver is an Option/empty-Vec outcome, not an error.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document is empty")]
    EmptyDocument,

    #[error("input does not look like HTML")]
    NotHtml,

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
