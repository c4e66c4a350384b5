use std::io;

/// Failure to build or load an index. Fatal at startup: the service refuses to serve rather
/// than answer from an empty or partial index.
#[derive(Debug, thiserror::Error)]
pub enum CorpusLoadError {
    #[error("I/O error reading corpus: {0}")]
    Io(#[from] io::Error),

    #[error("malformed corpus record on line {line}")]
    Malformed { line: u64 },

    #[error("corpus contains no records")]
    Empty,

    #[error("corrupt index: {0}")]
    Corrupt(&'static str),

    #[error("invalid index parameters: {0}")]
    InvalidParameters(&'static str),
}

/// Failure of a single lookup against an already loaded index.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("I/O error during lookup: {0}")]
    Io(#[from] io::Error),

    #[error("index data is corrupt: {0}")]
    Corrupt(&'static str),
}

/// A digest could not be parsed from its hex form.
///
/// Carries no part of the rejected input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    #[error("expected {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("input is not a valid hexadecimal digest")]
    InvalidHex,
}
