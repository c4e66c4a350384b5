use std::path::PathBuf;

use pwned_index::{CorpusLoadError, DigestError, LookupError};
use pwned_strength::InputTooLong;

/// Startup, configuration and I/O failures of the binary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load index: {0}")]
    Index(#[from] CorpusLoadError),

    #[error("invalid configuration: {0}")]
    Config(&'static str),

    #[error("failed to read TLS material from {path}: {source}")]
    TlsPem {
        path: PathBuf,
        #[source]
        source: rustls::pki_types::pem::Error,
    },

    #[error("TLS configuration rejected: {0}")]
    Tls(#[from] rustls::Error),

    #[error("could not generate a self-signed certificate: {0}")]
    SelfSigned(#[from] rcgen::Error),

    #[error("File '{path}' exists. Use --force to overwrite.")]
    FileExists { path: PathBuf },

    #[error("{0}")]
    Check(#[from] CheckError),
}

/// Failure of a single check. The messages never contain any part of the checked value.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("invalid hash: {0}")]
    InvalidDigest(#[from] DigestError),

    #[error("{0}")]
    InputTooLong(#[from] InputTooLong),

    #[error("index lookup failed")]
    InternalLookup(#[from] LookupError),
}
