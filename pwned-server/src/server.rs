use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use pwned_index::SharedIndex;
use pwned_strength::StrengthEstimator;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tokio::{signal, task};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::api::{self, Api};
use crate::config::{Limits, ServerConfig, TlsSource};
use crate::error::Error;
use crate::loader::{IndexFormat, load_index};
use crate::service::CheckService;
use crate::tls;

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Loads the index, binds the listener and serves until SIGINT or SIGTERM. On Unix, SIGHUP
/// reloads the index from the same path.
pub async fn serve(config: ServerConfig) -> Result<(), Error> {
    let started = Instant::now();
    let index = SharedIndex::new(
        load_blocking(config.index.clone(), config.format, config.allow_partial).await?,
    );
    let service = CheckService::new(index.clone())
        .with_estimator(StrengthEstimator::with_max_len(config.max_password_len));
    let api = Arc::new(Api::new(Arc::new(service), &config.limits));
    let tls = match &config.tls {
        Some(TlsSource::Files(paths)) => Some(tls::load_acceptor(paths)?),
        Some(TlsSource::SelfSigned) => {
            warn!("using an auto-generated self-signed certificate, not suitable for production");
            Some(tls::self_signed_acceptor(&tls::SELF_SIGNED_NAMES)?.0)
        }
        None => None,
    };

    let listener = TcpListener::bind(config.listen).await?;
    info!(
        addr = %listener.local_addr()?,
        tls = tls.is_some(),
        startup_ms = started.elapsed().as_millis() as u64,
        "listening"
    );

    #[cfg(unix)]
    let reloader =
        spawn_reloader(index, config.index.clone(), config.format, config.allow_partial)?;
    let result = run(listener, api, tls, config.limits, shutdown_signal()).await;
    #[cfg(unix)]
    reloader.abort();
    result
}

/// Accepts connections on `listener` until `shutdown` resolves, then stops accepting and
/// gives open connections up to `limits.shutdown_grace` to finish.
pub async fn run<F>(
    listener: TcpListener,
    api: Arc<Api>,
    tls: Option<TlsAcceptor>,
    limits: Limits,
    shutdown: F,
) -> Result<(), Error>
where
    F: Future<Output = ()> + Send,
{
    let connections = Arc::new(Semaphore::new(limits.max_connections));
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::pin!(shutdown);

    loop {
        // Waiting for a permit before accepting leaves excess clients in the listen backlog.
        let permit = tokio::select! {
            () = &mut shutdown => break,
            permit = Arc::clone(&connections).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let (stream, peer) = tokio::select! {
            () = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        let api = Arc::clone(&api);
        let tls = tls.clone();
        let stop = stop_rx.clone();
        let header_timeout = limits.request_timeout;
        tokio::spawn(async move {
            let _permit = permit;
            match tls {
                None => serve_connection(stream, api, stop, header_timeout).await,
                Some(acceptor) => {
                    match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await
                    {
                        Ok(Ok(stream)) => serve_connection(stream, api, stop, header_timeout).await,
                        Ok(Err(err)) => debug!(%peer, error = %err, "TLS handshake failed"),
                        Err(_) => debug!(%peer, "TLS handshake timed out"),
                    }
                }
            }
        });
    }

    drop(listener);
    let open = limits.max_connections - connections.available_permits();
    info!(open, "shutting down");
    stop_tx.send_replace(true);

    // every connection task holds one permit until it finishes
    let all = u32::try_from(limits.max_connections).unwrap_or(u32::MAX);
    match tokio::time::timeout(limits.shutdown_grace, connections.acquire_many(all)).await {
        Ok(_) => info!("all connections closed"),
        Err(_) => warn!(
            open = limits.max_connections - connections.available_permits(),
            "grace period elapsed, dropping remaining connections"
        ),
    }
    Ok(())
}

async fn serve_connection<S>(
    stream: S,
    api: Arc<Api>,
    mut stop: watch::Receiver<bool>,
    header_timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |request: http::Request<Incoming>| {
        api::serve_request(Arc::clone(&api), request)
    });
    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(header_timeout)
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        // the flag only ever flips once, to true
        _ = stop.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };
    if let Err(err) = result {
        debug!(error = %err, "connection closed with error");
    }
}

async fn load_blocking(
    path: PathBuf,
    format: IndexFormat,
    allow_partial: bool,
) -> Result<Arc<dyn pwned_index::HashIndex>, Error> {
    let loaded = task::spawn_blocking(move || load_index(&path, format, allow_partial))
        .await
        .map_err(io::Error::other)?;
    Ok(loaded?)
}

/// Builds a complete new index from `path` and swaps it in. On failure the served index is
/// left untouched.
pub async fn reload_index(
    index: &SharedIndex,
    path: PathBuf,
    format: IndexFormat,
    allow_partial: bool,
) -> Result<u64, Error> {
    let loaded = load_blocking(path, format, allow_partial).await?;
    let items = loaded.count();
    index.swap(loaded);
    Ok(items)
}

#[cfg(unix)]
fn spawn_reloader(
    index: SharedIndex,
    path: PathBuf,
    format: IndexFormat,
    allow_partial: bool,
) -> io::Result<task::JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading index");
            match reload_index(&index, path.clone(), format, allow_partial).await {
                Ok(items) => info!(items, "index reloaded"),
                Err(err) => error!(error = %err, "reload failed, keeping the current index"),
            }
        }
    }))
}

/// Resolves on SIGINT, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("SIGINT received"),
        () = terminate => info!("SIGTERM received"),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pwned_index::{SortedIndex, sha1};

    use super::*;

    #[tokio::test]
    async fn test_reload_swaps_only_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.txt");
        fs::write(&path, "5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8\n").unwrap();

        let index = SharedIndex::from_index(SortedIndex::from_digests([sha1(b"qwerty")]).unwrap());
        let items = reload_index(&index, path.clone(), IndexFormat::Text, false).await.unwrap();
        assert_eq!(items, 1);
        assert!(index.current().contains(&sha1(b"password")).unwrap());

        fs::write(&path, "5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8\ngarbage\n").unwrap();
        let err = reload_index(&index, path, IndexFormat::Text, false).await.unwrap_err();
        assert!(matches!(err, Error::Index(_)));
        assert!(index.current().contains(&sha1(b"password")).unwrap());
    }
}
