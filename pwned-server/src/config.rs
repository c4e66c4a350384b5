use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use pwned_strength::DEFAULT_MAX_LEN;

use crate::error::Error;
use crate::loader::IndexFormat;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:3100";
pub const DEFAULT_MAX_CONNECTIONS: usize = 2048;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 512;
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Arguments of `pwned-server serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Index to serve: a GCS file, a text corpus or a prefix directory
    #[arg(short, long, env = "PWNED_INDEX")]
    pub index: PathBuf,

    /// Index format
    #[arg(long, value_enum, default_value_t = IndexFormat::Auto)]
    pub format: IndexFormat,

    /// Serve a prefix directory that lacks some prefix files. Lookups on a missing prefix
    /// fail with 500.
    #[arg(long, env = "PWNED_ALLOW_PARTIAL")]
    pub allow_partial: bool,

    /// Address to listen on
    #[arg(short, long, env = "PWNED_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// TLS certificate chain (PEM). Requires --tls-key.
    #[arg(long, env = "PWNED_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM). Requires --tls-cert.
    #[arg(long, env = "PWNED_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Serve TLS with a self-signed certificate generated at startup
    #[arg(long, env = "PWNED_SELF_TLS", conflicts_with_all = ["tls_cert", "tls_key"])]
    pub self_tls: bool,

    /// Maximum concurrently open connections
    #[arg(long, env = "PWNED_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Maximum requests being checked at once
    #[arg(long, env = "PWNED_MAX_IN_FLIGHT", default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    pub max_in_flight: usize,

    /// Maximum accepted request body in bytes
    #[arg(long, env = "PWNED_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Per-request time limit in seconds
    #[arg(
        long,
        env = "PWNED_REQUEST_TIMEOUT",
        default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs()
    )]
    pub request_timeout_secs: u64,

    /// Longest password accepted for strength estimation, in characters
    #[arg(long, env = "PWNED_MAX_PASSWORD_LEN", default_value_t = DEFAULT_MAX_LEN)]
    pub max_password_len: usize,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Where the server certificate comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsSource {
    Files(TlsPaths),
    /// Generated in memory at startup, renewed on every restart.
    SelfSigned,
}

/// Resource limits applied by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub max_connections: usize,
    pub max_in_flight: usize,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub index: PathBuf,
    pub format: IndexFormat,
    pub allow_partial: bool,
    pub listen: SocketAddr,
    pub tls: Option<TlsSource>,
    pub limits: Limits,
    pub max_password_len: usize,
}

impl TryFrom<ServeArgs> for ServerConfig {
    type Error = Error;

    fn try_from(args: ServeArgs) -> Result<Self, Error> {
        let tls = match (args.tls_cert, args.tls_key, args.self_tls) {
            (Some(cert), Some(key), false) => Some(TlsSource::Files(TlsPaths { cert, key })),
            (None, None, true) => Some(TlsSource::SelfSigned),
            (None, None, false) => None,
            (_, _, true) => {
                return Err(Error::Config("--self-tls cannot be combined with a certificate"));
            }
            _ => return Err(Error::Config("--tls-cert and --tls-key must be given together")),
        };

        if args.max_connections == 0 || args.max_in_flight == 0 {
            return Err(Error::Config("connection and in-flight limits must be non-zero"));
        }
        if args.max_body_bytes == 0 {
            return Err(Error::Config("--max-body-bytes must be non-zero"));
        }
        if args.request_timeout_secs == 0 {
            return Err(Error::Config("--request-timeout-secs must be non-zero"));
        }
        if args.max_password_len == 0 {
            return Err(Error::Config("--max-password-len must be non-zero"));
        }

        Ok(Self {
            index: args.index,
            format: args.format,
            allow_partial: args.allow_partial,
            listen: args.listen,
            tls,
            limits: Limits {
                max_connections: args.max_connections,
                max_in_flight: args.max_in_flight,
                max_body_bytes: args.max_body_bytes,
                request_timeout: Duration::from_secs(args.request_timeout_secs),
                shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            },
            max_password_len: args.max_password_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        serve: ServeArgs,
    }

    fn parse(args: &[&str]) -> Result<ServerConfig, Error> {
        let cli = Cli::try_parse_from(std::iter::once("pwned-server").chain(args.iter().copied()))
            .map_err(|_| Error::Config("parse"))?;
        ServerConfig::try_from(cli.serve)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--index", "corpus.gcs"]).unwrap();
        assert_eq!(config.listen, "0.0.0.0:3100".parse::<SocketAddr>().unwrap());
        assert_eq!(config.format, IndexFormat::Auto);
        assert_eq!(config.tls, None);
        assert!(!config.allow_partial);
        assert_eq!(config.limits, Limits::default());
        assert_eq!(config.max_password_len, 256);
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--index",
            "corpus.txt",
            "--format",
            "text",
            "--listen",
            "127.0.0.1:8080",
            "--max-in-flight",
            "4",
            "--request-timeout-secs",
            "2",
            "--tls-cert",
            "cert.pem",
            "--tls-key",
            "key.pem",
        ])
        .unwrap();
        assert_eq!(config.format, IndexFormat::Text);
        assert_eq!(config.limits.max_in_flight, 4);
        assert_eq!(config.limits.request_timeout, Duration::from_secs(2));
        let Some(TlsSource::Files(paths)) = config.tls else {
            panic!("expected certificate files, got {:?}", config.tls);
        };
        assert_eq!(paths.key, PathBuf::from("key.pem"));

        let config =
            parse(&["--index", "data", "--format", "prefix-dir", "--allow-partial"]).unwrap();
        assert_eq!(config.format, IndexFormat::PrefixDir);
        assert!(config.allow_partial);

        let config = parse(&["--index", "corpus.gcs", "--self-tls"]).unwrap();
        assert_eq!(config.tls, Some(TlsSource::SelfSigned));
    }

    #[test]
    fn test_invalid_combinations() {
        assert!(parse(&["--index", "x", "--tls-cert", "cert.pem"]).is_err());
        assert!(
            parse(&["--index", "x", "--self-tls", "--tls-cert", "c.pem", "--tls-key", "k.pem"])
                .is_err()
        );
        assert!(parse(&["--index", "x", "--max-connections", "0"]).is_err());
        assert!(parse(&["--index", "x", "--max-password-len", "0"]).is_err());
        assert!(parse(&["--listen", "127.0.0.1:1"]).is_err());
    }
}
