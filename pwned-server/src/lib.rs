//! Breach-check HTTP service.
//!
//! Reports whether a password, or its SHA-1 digest, appears in a compromised-credentials
//! corpus. Password checks also return a strength estimate. The corpus is loaded once into an
//! immutable [`pwned_index::HashIndex`] and shared by every request.
//!
//! ```text
//! POST /v1/check/hash      {"hash": "<40 hex>"}       -> {"pwned": bool}
//! POST /v1/check/password  {"password": "<string>"}   -> {"pwned": bool, "strength": {...}}
//! GET  /health                                        -> {"status": "ok", "items": N}
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod loader;
pub mod server;
pub mod service;
pub mod tls;

pub use api::Api;
pub use config::{Limits, ServeArgs, ServerConfig, TlsPaths, TlsSource};
pub use error::{CheckError, Error};
pub use loader::{IndexFormat, build_gcs_file, detect_format, load_index};
pub use service::{CheckRequest, CheckResponse, CheckService};
